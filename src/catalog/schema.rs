//! SQLite schema definitions for the scrobble catalog database.
//!
//! Artists, albums and songs are keyed by integer ids; MusicBrainz ids are
//! stored as nullable text and indexed for the merge reconciler. Scrobbles
//! reference catalog rows through nullable foreign keys so that an event can
//! be stored before (or without) being resolved.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

// =============================================================================
// Catalog Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ), // JSON array of strings
        sqlite_column!("bio", &SqlType::Text),
        sqlite_column!("origin", &SqlType::Text, non_null = true), // see Origin::to_db_str
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_artists_name", "name COLLATE NOCASE"),
        ("idx_artists_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("track_count", &SqlType::Integer),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("origin", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_albums_artist", "artist_id"),
        ("idx_albums_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Integer), // seconds
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!("origin", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_songs_artist", "artist_name COLLATE NOCASE"),
        ("idx_songs_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const SCROBBLES_TABLE_V0: Table = Table {
    name: "scrobbles",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("track_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true), // unix seconds
        sqlite_column!("date_text", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("song_id", &SqlType::Integer, foreign_key = Some(&SONG_FK)),
        sqlite_column!("album_id", &SqlType::Integer, foreign_key = Some(&ALBUM_FK)),
        sqlite_column!("artist_id", &SqlType::Integer, foreign_key = Some(&ARTIST_FK)),
    ],
    indices: &[
        ("idx_scrobbles_timestamp", "timestamp"),
        ("idx_scrobbles_song", "song_id"),
    ],
    unique_constraints: &[&["artist_name", "track_name", "timestamp"]],
};

// =============================================================================
// Version 1 - Case-insensitive scrobble identity
// =============================================================================

/// Scrobble identity ignores the casing of artist and track names.
const SCROBBLES_TABLE_V1: Table = Table {
    name: "scrobbles",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("track_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true), // unix seconds
        sqlite_column!("date_text", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("song_id", &SqlType::Integer, foreign_key = Some(&SONG_FK)),
        sqlite_column!("album_id", &SqlType::Integer, foreign_key = Some(&ALBUM_FK)),
        sqlite_column!("artist_id", &SqlType::Integer, foreign_key = Some(&ARTIST_FK)),
    ],
    indices: &[
        ("idx_scrobbles_timestamp", "timestamp"),
        ("idx_scrobbles_song", "song_id"),
    ],
    unique_constraints: &[&[
        "artist_name COLLATE NOCASE",
        "track_name COLLATE NOCASE",
        "timestamp",
    ]],
};

/// Migration from version 0 to version 1: rebuild scrobbles with a
/// case-insensitive identity, keeping the oldest row of each case variant.
fn migrate_v0_to_v1(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "DROP INDEX idx_scrobbles_timestamp;
         DROP INDEX idx_scrobbles_song;
         ALTER TABLE scrobbles RENAME TO scrobbles_v0;",
    )?;
    SCROBBLES_TABLE_V1.create(conn)?;
    conn.execute_batch(
        "INSERT OR IGNORE INTO scrobbles
             (id, track_name, album_name, artist_name, timestamp, date_text, url,
              song_id, album_id, artist_id)
         SELECT id, track_name, album_name, artist_name, timestamp, date_text, url,
                song_id, album_id, artist_id
         FROM scrobbles_v0 ORDER BY id;
         DROP TABLE scrobbles_v0;",
    )?;
    Ok(())
}

/// One row per remote account.
const SYNC_STATE_TABLE: Table = Table {
    name: "sync_state",
    columns: &[
        sqlite_column!("account", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "last_timestamp",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            ARTISTS_TABLE,
            ALBUMS_TABLE,
            SONGS_TABLE,
            SCROBBLES_TABLE_V0,
            SYNC_STATE_TABLE,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE,
            ALBUMS_TABLE,
            SONGS_TABLE,
            SCROBBLES_TABLE_V1,
            SYNC_STATE_TABLE,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];
