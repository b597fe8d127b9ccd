//! Catalog models for the SQLite-backed scrobble catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Enumerations
// =============================================================================

/// Provenance of a catalog row: which source last authoritatively populated it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Already present in the catalog (written by another producer).
    Local,
    /// Minimal row created by the manual fallback.
    Manual,
    /// Populated from a MusicBrainz record.
    MusicBrainz,
    /// Populated from Last.fm metadata only.
    Online,
    /// MusicBrainz record enriched with Last.fm metadata.
    MusicBrainzOnline,
}

impl Origin {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "manual" => Origin::Manual,
            "musicbrainz" => Origin::MusicBrainz,
            "online" => Origin::Online,
            "musicbrainz+online" => Origin::MusicBrainzOnline,
            _ => Origin::Local,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Manual => "manual",
            Origin::MusicBrainz => "musicbrainz",
            Origin::Online => "online",
            Origin::MusicBrainzOnline => "musicbrainz+online",
        }
    }

    /// Origin after merging in Last.fm metadata.
    pub fn with_online(self) -> Self {
        match self {
            Origin::MusicBrainz | Origin::MusicBrainzOnline => Origin::MusicBrainzOnline,
            _ => Origin::Online,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

/// The three catalog entity kinds the resolver and the merge reconciler handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntityKind {
    Artist,
    Album,
    Song,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Song => "song",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "artist" | "artists" => Some(EntityKind::Artist),
            "album" | "albums" => Some(EntityKind::Album),
            "song" | "songs" | "track" | "tracks" => Some(EntityKind::Song),
            _ => None,
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Album => "albums",
            EntityKind::Song => "songs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Core Entities
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub mbid: Option<String>,
    pub tags: Vec<String>,
    pub bio: Option<String>,
    pub origin: Origin,
}

/// Artist row to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewArtist {
    pub name: String,
    pub mbid: Option<String>,
    pub tags: Vec<String>,
    pub bio: Option<String>,
    pub origin: Origin,
}

impl NewArtist {
    pub fn minimal(name: &str, mbid: Option<&str>, origin: Origin) -> Self {
        Self {
            name: name.to_string(),
            mbid: mbid.map(str::to_string),
            tags: Vec::new(),
            bio: None,
            origin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub track_count: Option<i32>,
    pub mbid: Option<String>,
    pub artist_id: i64,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAlbum {
    pub name: String,
    pub year: Option<i32>,
    pub track_count: Option<i32>,
    pub mbid: Option<String>,
    pub artist_id: i64,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub mbid: Option<String>,
    /// Duration in seconds
    pub duration: Option<i64>,
    pub genre: Option<String>,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewSong {
    pub title: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub mbid: Option<String>,
    pub duration: Option<i64>,
    pub genre: Option<String>,
    pub origin: Origin,
}

/// A stored listening event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scrobble {
    pub id: i64,
    pub track_name: String,
    pub album_name: Option<String>,
    pub artist_name: String,
    pub timestamp: i64,
    pub date_text: String,
    pub url: Option<String>,
    pub song_id: Option<i64>,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewScrobble {
    pub track_name: String,
    pub album_name: Option<String>,
    pub artist_name: String,
    pub timestamp: i64,
    pub date_text: String,
    pub url: Option<String>,
    pub song_id: Option<i64>,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
}

/// Per-row outcome of a batched scrobble insert.
#[derive(Debug, Default)]
pub struct ScrobbleBatchOutcome {
    /// (position in the batch, new row id)
    pub inserted: Vec<(usize, i64)>,
    /// (position in the batch, error message)
    pub failed: Vec<(usize, String)>,
}

/// Row counts, used for logging and the `stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
    pub scrobbles: usize,
    pub unresolved_scrobbles: usize,
}
