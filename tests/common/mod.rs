//! Common test infrastructure
//!
//! Fakes for the scrobble source, the metadata provider and the operator,
//! a temporary on-disk catalog with its cache, and a throwaway HTTP server
//! for exercising the real clients.
//! Tests should only import from this module, not from internal submodules.

#![allow(dead_code, unused_imports)]

mod constants;
mod fakes;
mod fixtures;
mod server;

pub use constants::*;
pub use fakes::{FakeMetadataProvider, FakeScrobbleSource, ScriptedPolicy};
pub use fixtures::{scrobble_event, test_sync_settings, TestCatalog};
pub use server::MockServer;
