//! End-to-end tests for entity resolution and backfill
//!
//! Exercises the resolver with its on-disk metadata cache, and the backfill
//! of stored scrobbles that could not be resolved when they were synced.

mod common;

use common::{
    FakeMetadataProvider, TestCatalog, BJORK_MBID, NUDE_MBID, RADIOHEAD_MBID, RECKONER_MBID,
};
use scrobble_sync::cache::TtlCache;
use scrobble_sync::catalog::{CatalogStore, NewScrobble, Origin, SqliteCatalogStore};
use scrobble_sync::config::{CacheSettings, ResolverSettings};
use scrobble_sync::resolver::{AutomaticPolicy, EntityRefs, EntityResolver};
use scrobble_sync::sync::backfill_unresolved;
use std::sync::Arc;

const DAY: i64 = 24 * 60 * 60;

fn provider() -> FakeMetadataProvider {
    FakeMetadataProvider::new()
        .with_artist(RADIOHEAD_MBID, "Radiohead", &["alternative rock"])
        .with_artist(BJORK_MBID, "Björk", &["electronic"])
        .with_release("release-ir", "In Rainbows", "Radiohead", "2007-10-10")
        .with_recording(RECKONER_MBID, "Reckoner", "Radiohead", 290_000)
        .with_recording(NUDE_MBID, "Nude", "Radiohead", 255_000)
}

fn resolve_radiohead(
    store: &SqliteCatalogStore,
    provider: &FakeMetadataProvider,
    cache: &mut TtlCache,
) -> Option<i64> {
    let mut resolver = EntityResolver::new(
        store,
        provider,
        cache,
        Box::new(AutomaticPolicy::new(false)),
        ResolverSettings::default(),
    );
    resolver.resolve_or_create_artist("Radiohead", Some(RADIOHEAD_MBID))
}

#[test]
fn test_cached_lookups_skip_the_provider_until_expiry() {
    let mut catalog = TestCatalog::new();
    let provider = provider();

    assert!(resolve_radiohead(&catalog.store, &provider, &mut catalog.cache).is_some());
    assert_eq!(provider.calls(), 1);

    // A fresh catalog still benefits from the cached record.
    let other = SqliteCatalogStore::open_in_memory().unwrap();
    assert!(resolve_radiohead(&other, &provider, &mut catalog.cache).is_some());
    assert_eq!(provider.calls(), 1);
    let artist = other.find_artist_by_mbid(RADIOHEAD_MBID).unwrap().unwrap();
    assert_eq!(artist.tags, vec!["alternative rock"]);

    catalog.clock.advance(31 * DAY);
    let third = SqliteCatalogStore::open_in_memory().unwrap();
    assert!(resolve_radiohead(&third, &provider, &mut catalog.cache).is_some());
    assert_eq!(provider.calls(), 2);
}

#[test]
fn test_cache_survives_reopen() {
    let mut catalog = TestCatalog::new();
    let provider = provider();
    resolve_radiohead(&catalog.store, &provider, &mut catalog.cache);
    assert_eq!(provider.calls(), 1);

    let mut reopened = TtlCache::new(
        &catalog.cache_dir,
        CacheSettings::default(),
        Arc::new(catalog.clock.clone()),
    )
    .unwrap();
    let other = SqliteCatalogStore::open_in_memory().unwrap();
    assert!(resolve_radiohead(&other, &provider, &mut reopened).is_some());

    assert_eq!(provider.calls(), 1);
}

#[test]
fn test_resolve_refs_builds_full_hierarchy() {
    let mut catalog = TestCatalog::new();
    let provider = provider();
    let mut resolver = EntityResolver::new(
        &catalog.store,
        &provider,
        &mut catalog.cache,
        Box::new(AutomaticPolicy::new(false)),
        ResolverSettings::default(),
    );

    let refs = EntityRefs {
        artist_name: "Radiohead",
        artist_mbid: None,
        album_name: Some("In Rainbows"),
        album_mbid: None,
        track_name: "Reckoner",
        track_mbid: None,
    };
    let ids = resolver.resolve_refs(refs);
    let again = resolver.resolve_refs(refs);
    let stats = resolver.stats();
    drop(resolver);

    assert!(ids.is_complete());
    assert_eq!(ids, again);
    assert_eq!(stats.created_from_remote, 3);

    let album = catalog
        .store
        .get_album(ids.album_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(album.year, Some(2007));
    assert_eq!(album.artist_id, ids.artist_id.unwrap());
    assert_eq!(album.origin, Origin::MusicBrainz);

    let song = catalog.store.get_song(ids.song_id.unwrap()).unwrap().unwrap();
    assert_eq!(song.mbid.as_deref(), Some(RECKONER_MBID));
    assert_eq!(song.duration, Some(290));
    assert_eq!(song.album_name.as_deref(), Some("In Rainbows"));
}

fn unresolved(artist: &str, track: &str, timestamp: i64) -> NewScrobble {
    NewScrobble {
        track_name: track.to_string(),
        album_name: None,
        artist_name: artist.to_string(),
        timestamp,
        date_text: "seeded".to_string(),
        url: None,
        song_id: None,
        album_id: None,
        artist_id: None,
    }
}

#[test]
fn test_backfill_resolves_what_it_can() {
    let mut catalog = TestCatalog::new();
    catalog
        .store
        .insert_scrobble_batch(&[
            unresolved("Radiohead", "Reckoner", 100),
            unresolved("Radiohead", "Nude", 200),
            unresolved("Nobody Knows", "Nothing", 300),
        ])
        .unwrap();

    let provider = provider();
    let mut resolver = EntityResolver::new(
        &catalog.store,
        &provider,
        &mut catalog.cache,
        Box::new(AutomaticPolicy::new(false)),
        ResolverSettings::default(),
    );
    let report = backfill_unresolved(&catalog.store, &mut resolver, 100).unwrap();
    drop(resolver);

    assert_eq!(report.examined, 3);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.still_unresolved, 1);

    let remaining = catalog.store.unresolved_scrobbles(0, 100).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].artist_name, "Nobody Knows");
    assert_eq!(remaining[0].artist_id, None);
}

#[test]
fn test_backfill_reaches_rows_behind_unresolvable_ones() {
    let mut catalog = TestCatalog::new();
    catalog
        .store
        .insert_scrobble_batch(&[
            unresolved("Nobody Knows", "Nothing", 100),
            unresolved("Nobody Knows", "Nothing Again", 200),
            unresolved("Nobody Knows", "Still Nothing", 300),
            unresolved("Radiohead", "Reckoner", 400),
        ])
        .unwrap();

    let provider = provider();
    let mut resolver = EntityResolver::new(
        &catalog.store,
        &provider,
        &mut catalog.cache,
        Box::new(AutomaticPolicy::new(false)),
        ResolverSettings::default(),
    );
    let report = backfill_unresolved(&catalog.store, &mut resolver, 2).unwrap();
    drop(resolver);

    assert_eq!(report.examined, 4);
    assert_eq!(report.resolved, 1);
    assert_eq!(report.still_unresolved, 3);
    assert_eq!(catalog.store.unresolved_scrobbles(0, 100).unwrap().len(), 3);
}
