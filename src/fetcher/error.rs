use std::fmt;
use std::time::Duration;

/// Failure categories for remote requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Connection, // Network error - retry
    Timeout,    // Request timeout - retry
    RateLimited, // HTTP 429 - retry after the advertised delay
    Server(u16), // 5xx - retry
    NotFound,   // 404 - NO retry
    Client(u16), // Other 4xx - NO retry
    Decode,     // Body is not what we expected - NO retry
}

impl FetchErrorKind {
    /// Returns true if this error type should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::Connection
                | FetchErrorKind::Timeout
                | FetchErrorKind::RateLimited
                | FetchErrorKind::Server(_)
        )
    }

    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(FetchErrorKind::RateLimited),
            404 => Some(FetchErrorKind::NotFound),
            500..=599 => Some(FetchErrorKind::Server(status)),
            400..=499 => Some(FetchErrorKind::Client(status)),
            _ => None,
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Connection => f.write_str("connection"),
            FetchErrorKind::Timeout => f.write_str("timeout"),
            FetchErrorKind::RateLimited => f.write_str("rate_limited"),
            FetchErrorKind::Server(code) => write!(f, "server_{}", code),
            FetchErrorKind::NotFound => f.write_str("not_found"),
            FetchErrorKind::Client(code) => write!(f, "client_{}", code),
            FetchErrorKind::Decode => f.write_str("decode"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Delay advertised by the server through `Retry-After`.
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: "Too many requests".to_string(),
            retry_after,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else if e.is_decode() {
            FetchErrorKind::Decode
        } else if let Some(kind) = e.status().and_then(|s| FetchErrorKind::from_status(s.as_u16()))
        {
            kind
        } else {
            FetchErrorKind::Connection
        };
        FetchError::new(kind, e.to_string())
    }
}
