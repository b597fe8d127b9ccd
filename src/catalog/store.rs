//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const ARTIST_COLUMNS: &str = "id, name, mbid, tags, bio, origin";
const ALBUM_COLUMNS: &str = "id, name, year, track_count, mbid, artist_id, origin";
const SONG_COLUMNS: &str = "id, title, artist_name, album_name, mbid, duration, genre, origin";
const SCROBBLE_COLUMNS: &str =
    "id, track_name, album_name, artist_name, timestamp, date_text, url, song_id, album_id, artist_id";

/// SQLite-backed catalog store.
///
/// The pipeline is single-threaded, so a single connection is enough; the
/// mutex only exists to make the store `Sync`.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    let tags_json: String = row.get(3)?;
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        mbid: row.get(2)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        bio: row.get(4)?,
        origin: Origin::from_db_str(&row.get::<_, String>(5)?),
    })
}

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        name: row.get(1)?,
        year: row.get(2)?,
        track_count: row.get(3)?,
        mbid: row.get(4)?,
        artist_id: row.get(5)?,
        origin: Origin::from_db_str(&row.get::<_, String>(6)?),
    })
}

fn song_from_row(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_name: row.get(2)?,
        album_name: row.get(3)?,
        mbid: row.get(4)?,
        duration: row.get(5)?,
        genre: row.get(6)?,
        origin: Origin::from_db_str(&row.get::<_, String>(7)?),
    })
}

fn scrobble_from_row(row: &Row) -> rusqlite::Result<Scrobble> {
    Ok(Scrobble {
        id: row.get(0)?,
        track_name: row.get(1)?,
        album_name: row.get(2)?,
        artist_name: row.get(3)?,
        timestamp: row.get(4)?,
        date_text: row.get(5)?,
        url: row.get(6)?,
        song_id: row.get(7)?,
        album_id: row.get(8)?,
        artist_id: row.get(9)?,
    })
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SqliteCatalogStore {
    /// Opens (creating or migrating if needed) the catalog at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn =
            Connection::open(db_path.as_ref()).context("Failed to open catalog database")?;
        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        let counts = store.counts()?;
        info!(
            "Opened catalog: {} artists, {} albums, {} songs, {} scrobbles",
            counts.artists, counts.albums, counts.songs, counts.scrobbles
        );
        Ok(store)
    }

    /// In-memory catalog, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Catalog connection mutex poisoned"))
    }

    /// Runs `f` inside `BEGIN IMMEDIATE`/`COMMIT`, rolling back on error.
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        conn.execute("BEGIN IMMEDIATE", [])?;
        match f(&conn) {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", []) {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    fn update_mbid(&self, kind: EntityKind, id: i64, mbid: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!("UPDATE {} SET mbid = ?1 WHERE id = ?2", kind.table()),
            params![mbid, id],
        )?;
        if changed == 0 {
            bail!("No {} with id {}", kind, id);
        }
        Ok(())
    }

    fn id_name_pairs(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<(i64, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let pairs = stmt
            .query_map(params, |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<(i64, String)>, _>>()?;
        Ok(pairs)
    }

    fn count(conn: &Connection, sql: &str) -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Artists
    // =========================================================================

    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        let artist = conn
            .query_row(
                &format!(
                    "SELECT {} FROM artists WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                    ARTIST_COLUMNS
                ),
                params![name],
                artist_from_row,
            )
            .optional()?;
        Ok(artist)
    }

    fn find_artist_by_mbid(&self, mbid: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        let artist = conn
            .query_row(
                &format!(
                    "SELECT {} FROM artists WHERE mbid = ?1 ORDER BY id LIMIT 1",
                    ARTIST_COLUMNS
                ),
                params![mbid],
                artist_from_row,
            )
            .optional()?;
        Ok(artist)
    }

    fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        let artist = conn
            .query_row(
                &format!("SELECT {} FROM artists WHERE id = ?1", ARTIST_COLUMNS),
                params![id],
                artist_from_row,
            )
            .optional()?;
        Ok(artist)
    }

    fn artist_names(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM artists ORDER BY id")?;
        let pairs = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<(i64, String)>, _>>()?;
        Ok(pairs)
    }

    fn insert_artist(&self, artist: &NewArtist) -> Result<i64> {
        let tags = serde_json::to_string(&artist.tags)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO artists (name, mbid, tags, bio, origin) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &artist.name,
                &artist.mbid,
                tags,
                &artist.bio,
                artist.origin.to_db_str()
            ],
        )
        .with_context(|| format!("Failed to insert artist '{}'", artist.name))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_artist_mbid(&self, id: i64, mbid: &str) -> Result<()> {
        self.update_mbid(EntityKind::Artist, id, mbid)
    }

    // =========================================================================
    // Albums
    // =========================================================================

    fn find_album(&self, name: &str, artist_id: i64) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let album = conn
            .query_row(
                &format!(
                    "SELECT {} FROM albums WHERE name = ?1 COLLATE NOCASE AND artist_id = ?2
                     ORDER BY id LIMIT 1",
                    ALBUM_COLUMNS
                ),
                params![name, artist_id],
                album_from_row,
            )
            .optional()?;
        Ok(album)
    }

    fn find_album_by_mbid(&self, mbid: &str) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let album = conn
            .query_row(
                &format!(
                    "SELECT {} FROM albums WHERE mbid = ?1 ORDER BY id LIMIT 1",
                    ALBUM_COLUMNS
                ),
                params![mbid],
                album_from_row,
            )
            .optional()?;
        Ok(album)
    }

    fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let album = conn
            .query_row(
                &format!("SELECT {} FROM albums WHERE id = ?1", ALBUM_COLUMNS),
                params![id],
                album_from_row,
            )
            .optional()?;
        Ok(album)
    }

    fn album_names_for_artist(&self, artist_id: i64) -> Result<Vec<(i64, String)>> {
        self.id_name_pairs(
            "SELECT id, name FROM albums WHERE artist_id = ?1 ORDER BY id",
            &[&artist_id],
        )
    }

    fn insert_album(&self, album: &NewAlbum) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO albums (name, year, track_count, mbid, artist_id, origin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &album.name,
                album.year,
                album.track_count,
                &album.mbid,
                album.artist_id,
                album.origin.to_db_str()
            ],
        )
        .with_context(|| format!("Failed to insert album '{}'", album.name))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_album_mbid(&self, id: i64, mbid: &str) -> Result<()> {
        self.update_mbid(EntityKind::Album, id, mbid)
    }

    // =========================================================================
    // Songs
    // =========================================================================

    fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
    ) -> Result<Option<Song>> {
        let conn = self.conn()?;
        let song = match album_name {
            // Prefer the exact album, accept a song stored without album.
            Some(album) => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM songs
                         WHERE title = ?1 COLLATE NOCASE AND artist_name = ?2 COLLATE NOCASE
                           AND (album_name IS NULL OR album_name = ?3 COLLATE NOCASE)
                         ORDER BY album_name IS NULL, id LIMIT 1",
                        SONG_COLUMNS
                    ),
                    params![title, artist_name, album],
                    song_from_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM songs
                         WHERE title = ?1 COLLATE NOCASE AND artist_name = ?2 COLLATE NOCASE
                         ORDER BY id LIMIT 1",
                        SONG_COLUMNS
                    ),
                    params![title, artist_name],
                    song_from_row,
                )
                .optional()?,
        };
        Ok(song)
    }

    fn find_song_by_mbid(&self, mbid: &str) -> Result<Option<Song>> {
        let conn = self.conn()?;
        let song = conn
            .query_row(
                &format!(
                    "SELECT {} FROM songs WHERE mbid = ?1 ORDER BY id LIMIT 1",
                    SONG_COLUMNS
                ),
                params![mbid],
                song_from_row,
            )
            .optional()?;
        Ok(song)
    }

    fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let conn = self.conn()?;
        let song = conn
            .query_row(
                &format!("SELECT {} FROM songs WHERE id = ?1", SONG_COLUMNS),
                params![id],
                song_from_row,
            )
            .optional()?;
        Ok(song)
    }

    fn song_titles_for_artist(
        &self,
        artist_name: &str,
        album_name: Option<&str>,
    ) -> Result<Vec<(i64, String)>> {
        match album_name {
            Some(album) => self.id_name_pairs(
                "SELECT id, title FROM songs
                 WHERE artist_name = ?1 COLLATE NOCASE
                   AND (album_name IS NULL OR album_name = ?2 COLLATE NOCASE)
                 ORDER BY id",
                &[&artist_name, &album],
            ),
            None => self.id_name_pairs(
                "SELECT id, title FROM songs WHERE artist_name = ?1 COLLATE NOCASE ORDER BY id",
                &[&artist_name],
            ),
        }
    }

    fn insert_song(&self, song: &NewSong) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO songs (title, artist_name, album_name, mbid, duration, genre, origin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &song.title,
                &song.artist_name,
                &song.album_name,
                &song.mbid,
                song.duration,
                &song.genre,
                song.origin.to_db_str()
            ],
        )
        .with_context(|| format!("Failed to insert song '{}'", song.title))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_song_mbid(&self, id: i64, mbid: &str) -> Result<()> {
        self.update_mbid(EntityKind::Song, id, mbid)
    }

    // =========================================================================
    // Scrobbles
    // =========================================================================

    fn scrobble_exists(&self, artist_name: &str, track_name: &str, timestamp: i64) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scrobbles
                           WHERE artist_name = ?1 COLLATE NOCASE
                             AND track_name = ?2 COLLATE NOCASE
                             AND timestamp = ?3)",
            params![artist_name, track_name, timestamp],
            |r| r.get(0),
        )?;
        Ok(exists)
    }

    fn insert_scrobble_batch(&self, scrobbles: &[NewScrobble]) -> Result<ScrobbleBatchOutcome> {
        self.in_transaction(|conn| {
            let mut outcome = ScrobbleBatchOutcome::default();
            let mut stmt = conn.prepare(
                "INSERT INTO scrobbles (track_name, album_name, artist_name, timestamp, date_text,
                                        url, song_id, album_id, artist_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (index, s) in scrobbles.iter().enumerate() {
                let result = stmt.execute(params![
                    &s.track_name,
                    &s.album_name,
                    &s.artist_name,
                    s.timestamp,
                    &s.date_text,
                    &s.url,
                    s.song_id,
                    s.album_id,
                    s.artist_id
                ]);
                match result {
                    Ok(_) => outcome.inserted.push((index, conn.last_insert_rowid())),
                    Err(e) => outcome.failed.push((index, e.to_string())),
                }
            }
            Ok(outcome)
        })
    }

    fn unresolved_scrobbles(&self, after_id: i64, limit: usize) -> Result<Vec<Scrobble>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scrobbles WHERE song_id IS NULL AND id > ?1 ORDER BY id LIMIT ?2",
            SCROBBLE_COLUMNS
        ))?;
        let scrobbles = stmt
            .query_map(params![after_id, limit as i64], scrobble_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scrobbles)
    }

    fn backfill_scrobble_ids(
        &self,
        scrobble_id: i64,
        song_id: Option<i64>,
        album_id: Option<i64>,
        artist_id: Option<i64>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE scrobbles SET song_id = COALESCE(song_id, ?1),
                                  album_id = COALESCE(album_id, ?2),
                                  artist_id = COALESCE(artist_id, ?3)
             WHERE id = ?4",
            params![song_id, album_id, artist_id, scrobble_id],
        )?;
        Ok(changed > 0)
    }

    fn delete_all_scrobbles(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM scrobbles", [])?)
    }

    // =========================================================================
    // Sync checkpoint
    // =========================================================================

    fn get_checkpoint(&self, account: &str) -> Result<i64> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT last_timestamp FROM sync_state WHERE account = ?1",
                params![account],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    fn advance_checkpoint(&self, account: &str, timestamp: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (account, last_timestamp, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(account) DO UPDATE SET
                last_timestamp = MAX(last_timestamp, excluded.last_timestamp),
                updated_at = excluded.updated_at",
            params![account, timestamp, now_secs()],
        )?;
        let value = conn.query_row(
            "SELECT last_timestamp FROM sync_state WHERE account = ?1",
            params![account],
            |r| r.get(0),
        )?;
        Ok(value)
    }

    fn reset_checkpoint(&self, account: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (account, last_timestamp, updated_at) VALUES (?1, 0, ?2)
             ON CONFLICT(account) DO UPDATE SET last_timestamp = 0, updated_at = excluded.updated_at",
            params![account, now_secs()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Merge support
    // =========================================================================

    fn duplicate_mbid_groups(&self, kind: EntityKind) -> Result<Vec<(String, Vec<i64>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT mbid, id FROM {} WHERE mbid IS NOT NULL AND TRIM(mbid) != '' ORDER BY id",
            kind.table()
        ))?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (mbid, id) in rows {
            groups.entry(mbid.trim().to_string()).or_default().push(id);
        }
        Ok(groups
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .collect())
    }

    fn merge_rows(&self, kind: EntityKind, canonical_id: i64, duplicate_id: i64) -> Result<()> {
        self.in_transaction(|conn| {
            match kind {
                EntityKind::Artist => {
                    conn.execute(
                        "UPDATE albums SET artist_id = ?1 WHERE artist_id = ?2",
                        params![canonical_id, duplicate_id],
                    )?;
                    conn.execute(
                        "UPDATE scrobbles SET artist_id = ?1 WHERE artist_id = ?2",
                        params![canonical_id, duplicate_id],
                    )?;
                }
                EntityKind::Album => {
                    conn.execute(
                        "UPDATE scrobbles SET album_id = ?1 WHERE album_id = ?2",
                        params![canonical_id, duplicate_id],
                    )?;
                }
                EntityKind::Song => {
                    conn.execute(
                        "UPDATE scrobbles SET song_id = ?1 WHERE song_id = ?2",
                        params![canonical_id, duplicate_id],
                    )?;
                }
            }
            let deleted = conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
                params![duplicate_id],
            )?;
            if deleted == 0 {
                bail!("{} {} vanished before it could be merged", kind, duplicate_id);
            }
            Ok(())
        })
    }

    // =========================================================================
    // Counts
    // =========================================================================

    fn counts(&self) -> Result<CatalogCounts> {
        let conn = self.conn()?;
        Ok(CatalogCounts {
            artists: Self::count(&conn, "SELECT COUNT(*) FROM artists")?,
            albums: Self::count(&conn, "SELECT COUNT(*) FROM albums")?,
            songs: Self::count(&conn, "SELECT COUNT(*) FROM songs")?,
            scrobbles: Self::count(&conn, "SELECT COUNT(*) FROM scrobbles")?,
            unresolved_scrobbles: Self::count(
                &conn,
                "SELECT COUNT(*) FROM scrobbles WHERE song_id IS NULL",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_scrobble(artist: &str, track: &str, ts: i64) -> NewScrobble {
        NewScrobble {
            track_name: track.to_string(),
            album_name: None,
            artist_name: artist.to_string(),
            timestamp: ts,
            date_text: format!("ts {}", ts),
            url: None,
            song_id: None,
            album_id: None,
            artist_id: None,
        }
    }

    #[test]
    fn test_artist_lookup_is_case_insensitive() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let id = store
            .insert_artist(&NewArtist::minimal("Radiohead", None, Origin::Manual))
            .unwrap();

        let found = store.find_artist_by_name("RADIOHEAD").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.origin, Origin::Manual);
        assert!(store.find_artist_by_name("Radio").unwrap().is_none());
    }

    #[test]
    fn test_artist_tags_roundtrip() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let id = store
            .insert_artist(&NewArtist {
                name: "Portishead".to_string(),
                mbid: Some("8f6bd1e4".to_string()),
                tags: vec!["trip hop".to_string(), "electronic".to_string()],
                bio: Some("Bristol".to_string()),
                origin: Origin::MusicBrainzOnline,
            })
            .unwrap();

        let artist = store.get_artist(id).unwrap().unwrap();
        assert_eq!(artist.tags, vec!["trip hop", "electronic"]);
        assert_eq!(artist.bio.as_deref(), Some("Bristol"));
        assert_eq!(
            store.find_artist_by_mbid("8f6bd1e4").unwrap().unwrap().id,
            id
        );
    }

    #[test]
    fn test_update_mbid_of_missing_row_fails() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        assert!(store.update_artist_mbid(42, "x").is_err());
    }

    #[test]
    fn test_find_song_prefers_matching_album() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let song = |album: Option<&str>| NewSong {
            title: "Creep".to_string(),
            artist_name: "Radiohead".to_string(),
            album_name: album.map(str::to_string),
            mbid: None,
            duration: None,
            genre: None,
            origin: Origin::Manual,
        };
        let no_album = store.insert_song(&song(None)).unwrap();
        let pablo = store.insert_song(&song(Some("Pablo Honey"))).unwrap();

        let found = store
            .find_song("creep", "radiohead", Some("pablo honey"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, pablo);

        let found = store
            .find_song("Creep", "Radiohead", Some("Live"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, no_album);

        let found = store.find_song("Creep", "Radiohead", None).unwrap().unwrap();
        assert_eq!(found.id, no_album);
    }

    #[test]
    fn test_scrobble_batch_reports_failed_rows_and_keeps_others() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let batch = vec![
            new_scrobble("A", "T", 100),
            new_scrobble("A", "T", 100),
            new_scrobble("A", "T", 200),
        ];

        let outcome = store.insert_scrobble_batch(&batch).unwrap();
        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 1);

        assert!(store.scrobble_exists("A", "T", 100).unwrap());
        assert!(store.scrobble_exists("A", "T", 200).unwrap());
        assert!(!store.scrobble_exists("A", "T", 300).unwrap());
    }

    #[test]
    fn test_scrobble_identity_ignores_name_casing() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .insert_scrobble_batch(&[new_scrobble("Radiohead", "Reckoner", 500)])
            .unwrap();

        assert!(store.scrobble_exists("radiohead", "RECKONER", 500).unwrap());

        let outcome = store
            .insert_scrobble_batch(&[new_scrobble("RADIOHEAD", "reckoner", 500)])
            .unwrap();
        assert!(outcome.inserted.is_empty());
        assert_eq!(store.counts().unwrap().scrobbles, 1);
    }

    #[test]
    fn test_unresolved_scrobbles_pages_by_id() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .insert_scrobble_batch(&[
                new_scrobble("A", "T1", 300),
                new_scrobble("A", "T2", 100),
                new_scrobble("A", "T3", 200),
            ])
            .unwrap();

        let first = store.unresolved_scrobbles(0, 2).unwrap();
        assert_eq!(
            first.iter().map(|s| s.track_name.as_str()).collect::<Vec<_>>(),
            vec!["T1", "T2"]
        );
        let rest = store.unresolved_scrobbles(first[1].id, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].track_name, "T3");
        assert!(store.unresolved_scrobbles(rest[0].id, 2).unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_never_regresses() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        assert_eq!(store.get_checkpoint("alice").unwrap(), 0);

        assert_eq!(store.advance_checkpoint("alice", 500).unwrap(), 500);
        assert_eq!(store.advance_checkpoint("alice", 300).unwrap(), 500);
        assert_eq!(store.get_checkpoint("bob").unwrap(), 0);

        store.reset_checkpoint("alice").unwrap();
        assert_eq!(store.get_checkpoint("alice").unwrap(), 0);
    }

    #[test]
    fn test_backfill_only_fills_null_ids() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let artist_id = store
            .insert_artist(&NewArtist::minimal("A", None, Origin::Manual))
            .unwrap();
        let mut scrobble = new_scrobble("A", "T", 1);
        scrobble.artist_id = Some(artist_id);
        let outcome = store.insert_scrobble_batch(&[scrobble]).unwrap();
        let scrobble_id = outcome.inserted[0].1;

        let other_artist = store
            .insert_artist(&NewArtist::minimal("B", None, Origin::Manual))
            .unwrap();
        store
            .backfill_scrobble_ids(scrobble_id, None, None, Some(other_artist))
            .unwrap();

        let unresolved = store.unresolved_scrobbles(0, 10).unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].artist_id, Some(artist_id));
    }

    #[test]
    fn test_merge_rows_repoints_albums() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let a = store
            .insert_artist(&NewArtist::minimal("Björk", Some("abc"), Origin::Manual))
            .unwrap();
        let b = store
            .insert_artist(&NewArtist::minimal("Bjork", Some("abc"), Origin::Manual))
            .unwrap();
        let album = store
            .insert_album(&NewAlbum {
                name: "Homogenic".to_string(),
                year: Some(1997),
                track_count: Some(10),
                mbid: None,
                artist_id: b,
                origin: Origin::Manual,
            })
            .unwrap();

        let groups = store.duplicate_mbid_groups(EntityKind::Artist).unwrap();
        assert_eq!(groups, vec![("abc".to_string(), vec![a, b])]);

        store.merge_rows(EntityKind::Artist, a, b).unwrap();
        assert!(store.get_artist(b).unwrap().is_none());
        assert_eq!(store.get_album(album).unwrap().unwrap().artist_id, a);
    }

    #[test]
    fn test_store_reopens_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&path).unwrap();
            store
                .insert_artist(&NewArtist::minimal("Low", None, Origin::Manual))
                .unwrap();
        }
        let store = SqliteCatalogStore::new(&path).unwrap();
        assert_eq!(store.counts().unwrap().artists, 1);
    }
}
