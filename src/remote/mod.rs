//! Remote services: the scrobble source (Last.fm) and the metadata
//! provider (MusicBrainz), each behind a trait so the pipeline can run
//! against fakes.

mod lastfm;
mod musicbrainz;

pub use lastfm::LastFmClient;
pub use musicbrainz::MusicBrainzClient;

use crate::fetcher::FetchError;
use serde::{Deserialize, Serialize};

// =============================================================================
// Scrobble source
// =============================================================================

/// One listening event as reported by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrobbleEvent {
    pub artist_name: String,
    pub artist_mbid: Option<String>,
    pub album_name: Option<String>,
    pub album_mbid: Option<String>,
    pub track_name: String,
    pub track_mbid: Option<String>,
    /// `None` for the "now playing" entry.
    pub timestamp: Option<i64>,
    pub date_text: Option<String>,
    pub url: Option<String>,
}

impl ScrobbleEvent {
    pub fn is_now_playing(&self) -> bool {
        self.timestamp.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based, page 1 holds the newest events.
    pub page: u32,
    pub limit: u32,
    /// Inclusive lower bound, unix seconds.
    pub from: Option<i64>,
    /// Inclusive upper bound, unix seconds.
    pub to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrobblePage {
    pub page: u32,
    pub total_pages: u32,
    pub events: Vec<ScrobbleEvent>,
}

pub trait ScrobbleSource {
    fn fetch_page(&self, request: &PageRequest) -> Result<ScrobblePage, FetchError>;
}

/// Artist tags and biography from the scrobble service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub name: String,
    pub mbid: Option<String>,
    pub tags: Vec<String>,
    pub bio: Option<String>,
}

pub trait ArtistInfoSource {
    /// `None` when the request failed or the artist is unknown.
    fn artist_info(&self, name: &str) -> Option<ArtistInfo>;
}

// =============================================================================
// Metadata provider
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MbArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Official homepage, when listed.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MbRelease {
    pub id: String,
    pub title: String,
    pub artist_name: Option<String>,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub date: Option<String>,
    pub track_count: Option<i32>,
}

impl MbRelease {
    pub fn year(&self) -> Option<i32> {
        self.date.as_deref()?.get(..4)?.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MbRecording {
    pub id: String,
    pub title: String,
    pub artist_name: Option<String>,
    pub length_ms: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Titles of the releases this recording appears on.
    #[serde(default)]
    pub releases: Vec<String>,
}

impl MbRecording {
    pub fn duration_secs(&self) -> Option<i64> {
        self.length_ms.map(|ms| (ms + 500) / 1000)
    }
}

/// Lookup and search over the metadata service.
///
/// Lookups return `None` when the record does not exist or the request
/// failed. Searches return `None` only when the request failed; an empty
/// result set is a valid answer.
pub trait MetadataProvider {
    fn lookup_artist(&self, mbid: &str) -> Option<MbArtist>;

    fn search_artists(&self, name: &str) -> Option<Vec<MbArtist>>;

    fn lookup_release(&self, mbid: &str) -> Option<MbRelease>;

    fn search_releases(&self, title: &str, artist: &str) -> Option<Vec<MbRelease>>;

    fn lookup_recording(&self, mbid: &str) -> Option<MbRecording>;

    fn search_recordings(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
    ) -> Option<Vec<MbRecording>>;
}

/// Empty strings from remote payloads mean "absent".
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
