//! Temporary catalog and cache for integration tests.

use super::constants::CLOCK_START;
use scrobble_sync::cache::{ManualClock, TtlCache};
use scrobble_sync::catalog::SqliteCatalogStore;
use scrobble_sync::config::{CacheSettings, ResolverSettings, SyncSettings};
use scrobble_sync::remote::{MetadataProvider, ScrobbleEvent, ScrobbleSource};
use scrobble_sync::resolver::{EntityResolver, ResolutionPolicy};
use scrobble_sync::sync::{SyncController, SyncError, SyncReport};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// On-disk catalog plus metadata cache, removed on drop.
pub struct TestCatalog {
    pub store: SqliteCatalogStore,
    pub cache: TtlCache,
    pub clock: ManualClock,
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestCatalog {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("catalog.db");
        let cache_dir = temp_dir.path().join("cache");
        let store = SqliteCatalogStore::new(&db_path).expect("Failed to open catalog store");
        let clock = ManualClock::new(CLOCK_START);
        let cache = TtlCache::new(
            &cache_dir,
            CacheSettings::default(),
            Arc::new(clock.clone()),
        )
        .expect("Failed to open cache");

        Self {
            store,
            cache,
            clock,
            db_path,
            cache_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Runs one sync with a fresh resolver over this catalog.
    pub fn sync(
        &mut self,
        source: &dyn ScrobbleSource,
        metadata: &dyn MetadataProvider,
        policy: Box<dyn ResolutionPolicy>,
        settings: SyncSettings,
        full_resync: bool,
    ) -> Result<SyncReport, SyncError> {
        let mut resolver = EntityResolver::new(
            &self.store,
            metadata,
            &mut self.cache,
            policy,
            ResolverSettings::default(),
        );
        SyncController::new(&self.store, source, &mut resolver, settings)
            .run(super::ACCOUNT, full_resync)
    }
}

/// Small pages and batches, no delay between requests.
pub fn test_sync_settings() -> SyncSettings {
    SyncSettings {
        page_limit: 3,
        page_delay_ms: 0,
        batch_size: 2,
        prompt_every: 25,
    }
}

pub fn scrobble_event(artist: &str, track: &str, timestamp: i64) -> ScrobbleEvent {
    ScrobbleEvent {
        artist_name: artist.to_string(),
        artist_mbid: None,
        album_name: None,
        album_mbid: None,
        track_name: track.to_string(),
        track_mbid: None,
        timestamp: Some(timestamp),
        date_text: None,
        url: None,
    }
}
