//! Namespaced, file-backed response cache with per-namespace expiry.

mod clock;
mod ttl_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl_cache::{normalize, CacheKey, TtlCache};
