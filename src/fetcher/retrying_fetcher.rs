//! Blocking HTTP client that retries transient failures.

use super::{FetchError, FetchErrorKind, RetryPolicy};
use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

pub struct RetryingFetcher {
    client: Client,
    policy: RetryPolicy,
    sleep: Sleeper,
}

impl RetryingFetcher {
    pub fn new(user_agent: &str, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(policy.timeout)
            .build()?;

        Ok(Self {
            client,
            policy,
            sleep: Arc::new(std::thread::sleep),
        })
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GETs `url` with `params` and decodes the JSON body, using the default
    /// policy. Failures are logged and reported as `None`.
    pub fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Option<Value> {
        match self.try_fetch(url, params, &self.policy) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                None
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but with an explicit policy and the final
    /// error handed back to the caller.
    pub fn try_fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        policy: &RetryPolicy,
    ) -> Result<Value, FetchError> {
        self.try_fetch_checked(url, params, policy, |_| None)
    }

    /// Like [`try_fetch`](Self::try_fetch), but every decoded body goes
    /// through `check` first. An error it returns is handled like an HTTP
    /// failure of the same kind, so APIs that report errors inside a 200
    /// response are retried too.
    pub fn try_fetch_checked(
        &self,
        url: &str,
        params: &[(&str, &str)],
        policy: &RetryPolicy,
        check: impl Fn(&Value) -> Option<FetchError>,
    ) -> Result<Value, FetchError> {
        let full_url = build_url(url, params);
        let mut attempts = 0;
        let mut backoff_step = 0;

        loop {
            attempts += 1;
            let result = self
                .attempt(&full_url, policy.timeout)
                .and_then(|value| match check(&value) {
                    Some(error) => Err(error),
                    None => Ok(value),
                });
            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !policy.should_retry(&error, attempts) {
                return Err(error);
            }

            // 429 uses up an attempt but not a backoff step.
            let wait = if error.kind == FetchErrorKind::RateLimited {
                policy.rate_limit_wait(error.retry_after)
            } else {
                let wait = policy.backoff(backoff_step);
                backoff_step += 1;
                wait
            };
            debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempts, policy.max_attempts, url, error, wait
            );
            (self.sleep)(wait);
        }
    }

    fn attempt(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::rate_limited(parse_retry_after(
                response.headers(),
            )));
        }
        if let Some(kind) = FetchErrorKind::from_status(status.as_u16()) {
            return Err(FetchError::new(kind, format!("HTTP {}", status)));
        }

        response
            .json::<Value>()
            .map_err(|e| FetchError::new(FetchErrorKind::Decode, e.to_string()))
    }
}

/// Appends `params` to `base` as an url-encoded query string.
pub fn build_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

/// `Retry-After` as either delta-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let secs = (date.timestamp() - chrono::Utc::now().timestamp()).max(0);
    Some(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_build_url_encodes_params() {
        assert_eq!(
            build_url("https://example.org/ws", &[("q", "AC/DC & co"), ("n", "1")]),
            "https://example.org/ws?q=AC%2FDC%20%26%20co&n=1"
        );
        assert_eq!(
            build_url("https://example.org/ws?fmt=json", &[("a", "b")]),
            "https://example.org/ws?fmt=json&a=b"
        );
        assert_eq!(build_url("https://example.org", &[]), "https://example.org");
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_connection_refused_exhausts_attempts() {
        use std::sync::Mutex;

        let waits = Arc::new(Mutex::new(Vec::new()));
        let recorded = waits.clone();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        };
        let fetcher = RetryingFetcher::new("test", policy)
            .unwrap()
            .with_sleeper(move |d| recorded.lock().unwrap().push(d));

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/nothing", port);
        assert!(fetcher.fetch(&url, &[]).is_none());
        assert_eq!(
            *waits.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }
}
