//! CatalogStore trait definition.

use super::models::*;
use anyhow::Result;

/// Storage backend for the relational catalog.
///
/// All name lookups are case-insensitive. Callers are expected to trim
/// names before handing them to the store.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Artists
    // =========================================================================

    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;

    fn find_artist_by_mbid(&self, mbid: &str) -> Result<Option<Artist>>;

    fn get_artist(&self, id: i64) -> Result<Option<Artist>>;

    /// All (id, name) pairs, lowest id first. Used as fuzzy-match candidates.
    fn artist_names(&self) -> Result<Vec<(i64, String)>>;

    fn insert_artist(&self, artist: &NewArtist) -> Result<i64>;

    fn update_artist_mbid(&self, id: i64, mbid: &str) -> Result<()>;

    // =========================================================================
    // Albums
    // =========================================================================

    fn find_album(&self, name: &str, artist_id: i64) -> Result<Option<Album>>;

    fn find_album_by_mbid(&self, mbid: &str) -> Result<Option<Album>>;

    fn get_album(&self, id: i64) -> Result<Option<Album>>;

    /// (id, name) pairs of the albums owned by `artist_id`.
    fn album_names_for_artist(&self, artist_id: i64) -> Result<Vec<(i64, String)>>;

    fn insert_album(&self, album: &NewAlbum) -> Result<i64>;

    fn update_album_mbid(&self, id: i64, mbid: &str) -> Result<()>;

    // =========================================================================
    // Songs
    // =========================================================================

    /// Looks a song up by title and artist, further narrowed by album when
    /// one is given.
    fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
    ) -> Result<Option<Song>>;

    fn find_song_by_mbid(&self, mbid: &str) -> Result<Option<Song>>;

    fn get_song(&self, id: i64) -> Result<Option<Song>>;

    /// (id, title) pairs of the songs credited to `artist_name`. With an
    /// album, only songs on that album or stored without one, as in
    /// [`find_song`](Self::find_song).
    fn song_titles_for_artist(
        &self,
        artist_name: &str,
        album_name: Option<&str>,
    ) -> Result<Vec<(i64, String)>>;

    fn insert_song(&self, song: &NewSong) -> Result<i64>;

    fn update_song_mbid(&self, id: i64, mbid: &str) -> Result<()>;

    // =========================================================================
    // Scrobbles
    // =========================================================================

    fn scrobble_exists(&self, artist_name: &str, track_name: &str, timestamp: i64) -> Result<bool>;

    /// Inserts all rows inside one transaction. A row that violates a
    /// constraint is reported in the outcome and does not prevent the
    /// others from being committed.
    fn insert_scrobble_batch(&self, scrobbles: &[NewScrobble]) -> Result<ScrobbleBatchOutcome>;

    /// Up to `limit` scrobbles with no song id and an id above `after_id`,
    /// in id order.
    fn unresolved_scrobbles(&self, after_id: i64, limit: usize) -> Result<Vec<Scrobble>>;

    /// Fills the ids that are currently null; ids already set are kept.
    fn backfill_scrobble_ids(
        &self,
        scrobble_id: i64,
        song_id: Option<i64>,
        album_id: Option<i64>,
        artist_id: Option<i64>,
    ) -> Result<bool>;

    fn delete_all_scrobbles(&self) -> Result<usize>;

    // =========================================================================
    // Sync checkpoint
    // =========================================================================

    /// Highest committed scrobble timestamp for `account`, 0 if none.
    fn get_checkpoint(&self, account: &str) -> Result<i64>;

    /// Raises the checkpoint to `timestamp`; never lowers it.
    fn advance_checkpoint(&self, account: &str, timestamp: i64) -> Result<i64>;

    fn reset_checkpoint(&self, account: &str) -> Result<()>;

    // =========================================================================
    // Merge support
    // =========================================================================

    /// Groups of row ids sharing a non-empty MusicBrainz id, each group
    /// ordered by ascending row id. Only groups with two or more rows.
    fn duplicate_mbid_groups(&self, kind: EntityKind) -> Result<Vec<(String, Vec<i64>)>>;

    /// Re-points every foreign key referencing `duplicate_id` to
    /// `canonical_id`, then deletes the duplicate row. Atomic.
    fn merge_rows(&self, kind: EntityKind, canonical_id: i64, duplicate_id: i64) -> Result<()>;

    // =========================================================================
    // Counts
    // =========================================================================

    fn counts(&self) -> Result<CatalogCounts>;
}
