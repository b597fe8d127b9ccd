mod error;
mod retry_policy;
mod retrying_fetcher;

pub use error::{FetchError, FetchErrorKind};
pub use retry_policy::{RetryPolicy, MAX_RATE_LIMIT_WAIT};
pub use retrying_fetcher::{build_url, RetryingFetcher};
