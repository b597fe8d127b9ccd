//! Scrobble Sync Library
//!
//! Pulls listening history from Last.fm into a local SQLite catalog,
//! resolving every event to artist, album and song rows enriched from
//! MusicBrainz.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod matching;
pub mod merge;
pub mod remote;
pub mod resolver;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use catalog::{CatalogStore, SqliteCatalogStore};
pub use merge::{DuplicateMergeReconciler, MergeReport};
pub use resolver::EntityResolver;
pub use sync::{SyncController, SyncError, SyncReport};
