//! End-to-end tests for duplicate merging
//!
//! Rows are seeded through a second SQLite connection so ids (and the
//! duplicates themselves) are exactly what the test needs.

mod common;

use common::TestCatalog;
use rusqlite::{params, Connection};
use scrobble_sync::catalog::{CatalogStore, EntityKind};
use scrobble_sync::merge::{DuplicateMergeReconciler, MergeReport};

fn seed(catalog: &TestCatalog) {
    let conn = Connection::open(&catalog.db_path).unwrap();
    conn.execute_batch(
        "INSERT INTO artists (id, name, mbid, origin) VALUES
             (5, 'Guns N'' Roses', 'mbid-gnr', 'musicbrainz'),
             (9, 'Guns N Roses', 'mbid-gnr', 'manual'),
             (12, 'Slash', 'mbid-slash', 'musicbrainz');
         INSERT INTO albums (id, name, mbid, artist_id, origin) VALUES
             (3, 'Appetite for Destruction', 'mbid-afd', 9, 'manual'),
             (4, 'Appetite For Destruction', 'mbid-afd', 5, 'musicbrainz');
         INSERT INTO songs (id, title, artist_name, mbid, origin) VALUES
             (2, 'Paradise City', 'Guns N'' Roses', 'mbid-pc', 'musicbrainz'),
             (8, 'Paradise City', 'Guns N Roses', 'mbid-pc', 'manual'),
             (11, 'Welcome to the Jungle', 'Guns N'' Roses', NULL, 'manual');",
    )
    .unwrap();

    let mut insert = conn
        .prepare(
            "INSERT INTO scrobbles (track_name, artist_name, timestamp, date_text,
                                    song_id, album_id, artist_id)
             VALUES (?1, ?2, ?3, 'seeded', ?4, ?5, ?6)",
        )
        .unwrap();
    insert
        .execute(params!["Paradise City", "Guns N Roses", 100, 8, 4, 9])
        .unwrap();
    insert
        .execute(params!["Paradise City", "Guns N' Roses", 200, 2, 3, 5])
        .unwrap();
    insert
        .execute(params!["Welcome to the Jungle", "Guns N Roses", 300, 11, 3, 9])
        .unwrap();
}

fn scrobble_refs(catalog: &TestCatalog) -> Vec<(i64, i64, i64)> {
    let conn = Connection::open(&catalog.db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT song_id, album_id, artist_id FROM scrobbles ORDER BY timestamp")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_merge_all_repoints_references_to_lowest_id() {
    let catalog = TestCatalog::new();
    seed(&catalog);

    let report = DuplicateMergeReconciler::new(&catalog.store)
        .merge_all()
        .unwrap();

    assert_eq!(
        report,
        MergeReport {
            artists: 1,
            albums: 1,
            songs: 1,
        }
    );

    assert!(catalog.store.get_artist(5).unwrap().is_some());
    assert!(catalog.store.get_artist(9).unwrap().is_none());
    assert!(catalog.store.get_artist(12).unwrap().is_some());
    assert!(catalog.store.get_album(4).unwrap().is_none());
    assert_eq!(catalog.store.get_album(3).unwrap().unwrap().artist_id, 5);
    assert!(catalog.store.get_song(8).unwrap().is_none());

    assert_eq!(
        scrobble_refs(&catalog),
        vec![(2, 3, 5), (2, 3, 5), (11, 3, 5)]
    );

    let counts = catalog.store.counts().unwrap();
    assert_eq!(counts.artists, 2);
    assert_eq!(counts.albums, 1);
    assert_eq!(counts.songs, 2);
    assert_eq!(counts.scrobbles, 3);
}

#[test]
fn test_merge_is_idempotent() {
    let catalog = TestCatalog::new();
    seed(&catalog);
    let reconciler = DuplicateMergeReconciler::new(&catalog.store);

    reconciler.merge_all().unwrap();
    let second = reconciler.merge_all().unwrap();

    assert_eq!(second.total(), 0);
}

#[test]
fn test_merge_single_kind_leaves_others() {
    let catalog = TestCatalog::new();
    seed(&catalog);

    let merged = DuplicateMergeReconciler::new(&catalog.store)
        .merge_by_external_id(EntityKind::Song)
        .unwrap();

    assert_eq!(merged, 1);
    assert!(catalog.store.get_artist(9).unwrap().is_some());
    assert!(catalog.store.get_album(4).unwrap().is_some());
    assert_eq!(scrobble_refs(&catalog)[0], (2, 4, 9));
}
