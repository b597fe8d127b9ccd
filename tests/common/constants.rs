//! Shared constants for integration tests

pub const ACCOUNT: &str = "alice";

pub const RADIOHEAD_MBID: &str = "a74b1b7f-71a5-4011-9441-d0b5e4122711";
pub const BJORK_MBID: &str = "87c5dedd-371d-4a53-9f7f-80522fb7f3cb";

pub const RECKONER_MBID: &str = "c7bf2a0a-0a4d-4fbb-8e9c-2c5a4e0a1b11";
pub const NUDE_MBID: &str = "0c3a7b5e-5d1e-4a1e-9c3e-9f1c2b3d4e55";

/// Start time of the manual clock driving the cache.
pub const CLOCK_START: i64 = 1_700_000_000;
