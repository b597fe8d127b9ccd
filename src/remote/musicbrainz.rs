//! MusicBrainz API client for artist, release and recording metadata.
//!
//! Rate limited to 1 request per second per MusicBrainz API policy.

use super::{non_empty, MbArtist, MbRecording, MbRelease, MetadataProvider};
use crate::fetcher::RetryingFetcher;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100); // slightly over 1s for safety
const SEARCH_LIMIT: &str = "5";

pub struct MusicBrainzClient {
    fetcher: RetryingFetcher,
    base_url: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct MbTag {
    name: String,
}

#[derive(Deserialize)]
struct MbUrl {
    resource: Option<String>,
}

#[derive(Deserialize)]
struct MbRelation {
    #[serde(rename = "type")]
    relation_type: Option<String>,
    url: Option<MbUrl>,
}

#[derive(Deserialize)]
struct MbArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Deserialize)]
struct MbArtistJson {
    id: String,
    name: String,
    #[serde(default)]
    tags: Vec<MbTag>,
    #[serde(default)]
    relations: Vec<MbRelation>,
}

#[derive(Deserialize)]
struct MbMedium {
    #[serde(rename = "track-count")]
    track_count: Option<i32>,
}

#[derive(Deserialize)]
struct MbReleaseJson {
    id: String,
    title: String,
    date: Option<String>,
    #[serde(rename = "track-count")]
    track_count: Option<i32>,
    #[serde(default)]
    media: Vec<MbMedium>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Deserialize)]
struct MbReleaseRef {
    title: String,
}

#[derive(Deserialize)]
struct MbRecordingJson {
    id: String,
    title: String,
    length: Option<i64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    releases: Vec<MbReleaseRef>,
    #[serde(default)]
    tags: Vec<MbTag>,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<MbArtistJson>,
}

#[derive(Deserialize)]
struct ReleaseSearchResponse {
    #[serde(default)]
    releases: Vec<MbReleaseJson>,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecordingJson>,
}

fn credit_name(credits: &[MbArtistCredit]) -> Option<String> {
    let joined: String = credits
        .iter()
        .map(|c| format!("{}{}", c.name, c.joinphrase))
        .collect();
    non_empty(Some(joined))
}

impl From<MbArtistJson> for MbArtist {
    fn from(a: MbArtistJson) -> Self {
        let url = a
            .relations
            .into_iter()
            .filter(|r| r.relation_type.as_deref() == Some("official homepage"))
            .find_map(|r| r.url.and_then(|u| u.resource));
        MbArtist {
            id: a.id,
            name: a.name,
            tags: a.tags.into_iter().map(|t| t.name).collect(),
            url,
        }
    }
}

impl From<MbReleaseJson> for MbRelease {
    fn from(r: MbReleaseJson) -> Self {
        let media_tracks: i32 = r.media.iter().filter_map(|m| m.track_count).sum();
        let track_count = r
            .track_count
            .or(if media_tracks > 0 { Some(media_tracks) } else { None });
        MbRelease {
            artist_name: credit_name(&r.artist_credit),
            id: r.id,
            title: r.title,
            date: non_empty(r.date),
            track_count,
        }
    }
}

impl From<MbRecordingJson> for MbRecording {
    fn from(r: MbRecordingJson) -> Self {
        MbRecording {
            artist_name: credit_name(&r.artist_credit),
            id: r.id,
            title: r.title,
            length_ms: r.length,
            tags: r.tags.into_iter().map(|t| t.name).collect(),
            releases: r.releases.into_iter().map(|rel| rel.title).collect(),
        }
    }
}

/// Quotes a value for a Lucene phrase query.
fn phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl MusicBrainzClient {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self {
            fetcher,
            base_url: MUSICBRAINZ_API_BASE.to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn rate_limit(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            std::thread::sleep(RATE_LIMIT_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Option<T> {
        self.rate_limit();

        let url = format!("{}/{}", self.base_url, path);
        let mut all_params = vec![("fmt", "json")];
        all_params.extend_from_slice(params);

        let body = self.fetcher.fetch(&url, &all_params)?;
        match serde_json::from_value(body) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Unexpected MusicBrainz response for {}: {}", path, e);
                None
            }
        }
    }

    fn search<T: DeserializeOwned>(&self, entity: &str, query: &str) -> Option<T> {
        self.get(entity, &[("query", query), ("limit", SEARCH_LIMIT)])
    }
}

impl MetadataProvider for MusicBrainzClient {
    fn lookup_artist(&self, mbid: &str) -> Option<MbArtist> {
        self.get::<MbArtistJson>(
            &format!("artist/{}", urlencoding::encode(mbid)),
            &[("inc", "tags+url-rels")],
        )
        .map(MbArtist::from)
    }

    fn search_artists(&self, name: &str) -> Option<Vec<MbArtist>> {
        let query = format!("artist:{}", phrase(name));
        let response: ArtistSearchResponse = self.search("artist", &query)?;
        Some(response.artists.into_iter().map(MbArtist::from).collect())
    }

    fn lookup_release(&self, mbid: &str) -> Option<MbRelease> {
        self.get::<MbReleaseJson>(
            &format!("release/{}", urlencoding::encode(mbid)),
            &[("inc", "artist-credits+media")],
        )
        .map(MbRelease::from)
    }

    fn search_releases(&self, title: &str, artist: &str) -> Option<Vec<MbRelease>> {
        let query = format!("release:{} AND artist:{}", phrase(title), phrase(artist));
        let response: ReleaseSearchResponse = self.search("release", &query)?;
        Some(response.releases.into_iter().map(MbRelease::from).collect())
    }

    fn lookup_recording(&self, mbid: &str) -> Option<MbRecording> {
        self.get::<MbRecordingJson>(
            &format!("recording/{}", urlencoding::encode(mbid)),
            &[("inc", "artist-credits+releases+tags")],
        )
        .map(MbRecording::from)
    }

    fn search_recordings(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
    ) -> Option<Vec<MbRecording>> {
        let mut query = format!("recording:{} AND artist:{}", phrase(title), phrase(artist));
        if let Some(album) = album {
            query.push_str(&format!(" AND release:{}", phrase(album)));
        }
        let response: RecordingSearchResponse = self.search("recording", &query)?;
        Some(response.recordings.into_iter().map(MbRecording::from).collect())
    }
}
