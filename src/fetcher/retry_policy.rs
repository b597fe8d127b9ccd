//! Retry policy for remote requests.
//!
//! Implements exponential backoff with special handling for rate limiting.

use crate::config::FetcherSettings;
use crate::fetcher::FetchError;
use std::time::Duration;

/// Longest `Retry-After` we are willing to honour.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: &FetcherSettings) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Backoff after the `step`-th (0-based) transient failure:
    /// `base_delay * 2^step`.
    pub fn backoff(&self, step: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(step))
    }

    /// Wait after a 429: the server's `Retry-After` (capped), or
    /// `base_delay * 2` when it did not say.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(MAX_RATE_LIMIT_WAIT),
            None => self.base_delay.saturating_mul(2),
        }
    }

    /// Check if an error should be retried after `attempts_made` attempts.
    pub fn should_retry(&self, error: &FetchError, attempts_made: u32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&FetcherSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchErrorKind;

    fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_new_from_config() {
        let policy = RetryPolicy::new(&FetcherSettings {
            max_attempts: 5,
            base_delay_ms: 250,
            timeout_secs: 10,
        });

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(&FetcherSettings {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = policy(5, 1000);

        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_rate_limit_wait() {
        let policy = policy(3, 1000);

        assert_eq!(
            policy.rate_limit_wait(Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(policy.rate_limit_wait(None), Duration::from_secs(2));
        assert_eq!(
            policy.rate_limit_wait(Some(Duration::from_secs(3600))),
            MAX_RATE_LIMIT_WAIT
        );
    }

    #[test]
    fn test_should_retry() {
        let policy = policy(3, 10);
        let timeout = FetchError::new(FetchErrorKind::Timeout, "slow");
        let not_found = FetchError::new(FetchErrorKind::NotFound, "gone");

        assert!(policy.should_retry(&timeout, 1));
        assert!(policy.should_retry(&timeout, 2));
        assert!(!policy.should_retry(&timeout, 3));
        assert!(!policy.should_retry(&not_found, 1));
    }
}
