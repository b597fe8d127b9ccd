//! Last.fm API client: recent tracks for one user and artist info.
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines.

use super::{
    non_empty, ArtistInfo, ArtistInfoSource, PageRequest, ScrobbleEvent, ScrobblePage,
    ScrobbleSource,
};
use crate::fetcher::{FetchError, FetchErrorKind, RetryingFetcher};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec

pub struct LastFmClient {
    fetcher: RetryingFetcher,
    base_url: String,
    user: String,
    api_key: String,
    last_request: Mutex<Instant>,
}

/// Last.fm returns a bare object instead of a one-element array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Deserialize)]
struct RecentTracks {
    track: Option<OneOrMany<LastFmTrack>>,
    #[serde(rename = "@attr")]
    attr: Option<RecentTracksAttr>,
}

#[derive(Deserialize)]
struct RecentTracksAttr {
    page: Option<String>,
    #[serde(rename = "totalPages")]
    total_pages: Option<String>,
}

/// `{"mbid": "...", "#text": "..."}`, the shape of artist/album refs.
#[derive(Deserialize, Default)]
struct TextRef {
    mbid: Option<String>,
    #[serde(rename = "#text")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct LastFmDate {
    uts: Option<String>,
    #[serde(rename = "#text")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct LastFmTrack {
    name: Option<String>,
    mbid: Option<String>,
    url: Option<String>,
    #[serde(default)]
    artist: TextRef,
    #[serde(default)]
    album: TextRef,
    date: Option<LastFmDate>,
}

#[derive(Deserialize)]
struct ArtistInfoResponse {
    artist: LastFmArtist,
}

#[derive(Deserialize)]
struct LastFmArtist {
    name: Option<String>,
    mbid: Option<String>,
    tags: Option<LastFmTags>,
    bio: Option<LastFmBio>,
}

#[derive(Deserialize)]
struct LastFmTags {
    tag: Option<OneOrMany<LastFmTag>>,
}

#[derive(Deserialize)]
struct LastFmTag {
    name: String,
}

#[derive(Deserialize)]
struct LastFmBio {
    summary: Option<String>,
}

impl LastFmClient {
    pub fn new(fetcher: RetryingFetcher, user: &str, api_key: &str) -> Self {
        Self {
            fetcher,
            base_url: LASTFM_API_BASE.to_string(),
            user: user.to_string(),
            api_key: api_key.to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        }
    }

    /// Points the client at another endpoint, e.g. a local test server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
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
}

impl ScrobbleSource for LastFmClient {
    fn fetch_page(&self, request: &PageRequest) -> Result<ScrobblePage, FetchError> {
        self.rate_limit();

        let page = request.page.to_string();
        let limit = request.limit.to_string();
        let from = request.from.map(|v| v.to_string());
        let to = request.to.map(|v| v.to_string());

        let mut params = vec![
            ("method", "user.getrecenttracks"),
            ("user", self.user.as_str()),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("page", page.as_str()),
            ("limit", limit.as_str()),
        ];
        if let Some(from) = &from {
            params.push(("from", from.as_str()));
        }
        if let Some(to) = &to {
            params.push(("to", to.as_str()));
        }

        let body = self.fetcher.try_fetch_checked(
            &self.base_url,
            &params,
            self.fetcher.policy(),
            api_error,
        )?;
        let page = parse_recent_tracks(body)?;
        debug!(
            "Fetched page {}/{} ({} events)",
            page.page,
            page.total_pages,
            page.events.len()
        );
        Ok(page)
    }
}

impl ArtistInfoSource for LastFmClient {
    fn artist_info(&self, name: &str) -> Option<ArtistInfo> {
        self.rate_limit();

        let params = [
            ("method", "artist.getinfo"),
            ("artist", name),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("autocorrect", "1"),
        ];
        let body = match self.fetcher.try_fetch_checked(
            &self.base_url,
            &params,
            self.fetcher.policy(),
            api_error,
        ) {
            Ok(body) => body,
            Err(e) if e.kind == FetchErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Last.fm artist info for '{}' failed: {}", name, e);
                return None;
            }
        };
        match parse_artist_info(body) {
            Ok(info) => info,
            Err(e) => {
                warn!("Last.fm artist info for '{}' unusable: {}", name, e);
                None
            }
        }
    }
}

/// Maps a Last.fm `{"error": n, "message": ...}` body to a fetch error.
fn api_error(body: &Value) -> Option<FetchError> {
    let code = body.get("error")?.as_i64()?;
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let kind = match code {
        29 => FetchErrorKind::RateLimited,
        6 | 7 => FetchErrorKind::NotFound,
        8 | 11 | 16 => FetchErrorKind::Server(503),
        _ => FetchErrorKind::Client(400),
    };
    Some(FetchError::new(kind, format!("Last.fm error {}: {}", code, message)))
}

fn parse_recent_tracks(body: Value) -> Result<ScrobblePage, FetchError> {
    if let Some(err) = api_error(&body) {
        return Err(err);
    }
    let response: RecentTracksResponse = serde_json::from_value(body)
        .map_err(|e| FetchError::new(FetchErrorKind::Decode, e.to_string()))?;
    let recent = response.recenttracks;

    let attr = recent.attr;
    let page = attr
        .as_ref()
        .and_then(|a| a.page.as_deref())
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    let total_pages = attr
        .as_ref()
        .and_then(|a| a.total_pages.as_deref())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    let events = recent
        .track
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            let track_name = non_empty(t.name)?;
            let artist_name = non_empty(t.artist.text)?;
            let (timestamp, date_text) = match t.date {
                Some(date) => (date.uts.and_then(|u| u.parse().ok()), date.text),
                None => (None, None),
            };
            Some(ScrobbleEvent {
                artist_name,
                artist_mbid: non_empty(t.artist.mbid),
                album_name: non_empty(t.album.text),
                album_mbid: non_empty(t.album.mbid),
                track_name,
                track_mbid: non_empty(t.mbid),
                timestamp,
                date_text,
                url: non_empty(t.url),
            })
        })
        .collect();

    Ok(ScrobblePage {
        page,
        total_pages,
        events,
    })
}

fn parse_artist_info(body: Value) -> Result<Option<ArtistInfo>, FetchError> {
    if let Some(err) = api_error(&body) {
        if err.kind == FetchErrorKind::NotFound {
            return Ok(None);
        }
        return Err(err);
    }
    let response: ArtistInfoResponse = serde_json::from_value(body)
        .map_err(|e| FetchError::new(FetchErrorKind::Decode, e.to_string()))?;
    let artist = response.artist;

    let Some(name) = non_empty(artist.name) else {
        return Ok(None);
    };
    let tags = artist
        .tags
        .and_then(|t| t.tag)
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.name)
        .collect();
    let bio = artist
        .bio
        .and_then(|b| b.summary)
        .map(|s| strip_read_more(&s))
        .filter(|s| !s.is_empty());

    Ok(Some(ArtistInfo {
        name,
        mbid: non_empty(artist.mbid),
        tags,
        bio,
    }))
}

/// Bio summaries end with a `<a href=...>Read more on Last.fm</a>` link.
fn strip_read_more(summary: &str) -> String {
    match summary.find("<a href") {
        Some(idx) => summary[..idx].trim().to_string(),
        None => summary.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_recent_tracks_page() {
        let body = json!({
            "recenttracks": {
                "track": [
                    {
                        "artist": {"mbid": "", "#text": "Radiohead"},
                        "album": {"mbid": "", "#text": "In Rainbows"},
                        "name": "Reckoner",
                        "mbid": "",
                        "url": "https://www.last.fm/music/Radiohead/_/Reckoner",
                        "@attr": {"nowplaying": "true"}
                    },
                    {
                        "artist": {"mbid": "a74b1b7f", "#text": "Radiohead"},
                        "album": {"mbid": "", "#text": ""},
                        "name": "Nude",
                        "mbid": "rec-1",
                        "url": "https://www.last.fm/music/Radiohead/_/Nude",
                        "date": {"uts": "1700000000", "#text": "14 Nov 2023, 22:13"}
                    }
                ],
                "@attr": {"user": "alice", "page": "2", "totalPages": "7", "perPage": "200"}
            }
        });

        let page = parse_recent_tracks(body).unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 7);
        assert_eq!(page.events.len(), 2);

        assert!(page.events[0].is_now_playing());
        assert_eq!(page.events[0].album_name.as_deref(), Some("In Rainbows"));

        let nude = &page.events[1];
        assert_eq!(nude.timestamp, Some(1_700_000_000));
        assert_eq!(nude.date_text.as_deref(), Some("14 Nov 2023, 22:13"));
        assert_eq!(nude.artist_mbid.as_deref(), Some("a74b1b7f"));
        assert_eq!(nude.album_name, None);
        assert_eq!(nude.track_mbid.as_deref(), Some("rec-1"));
    }

    #[test]
    fn test_parse_single_track_object() {
        let body = json!({
            "recenttracks": {
                "track": {
                    "artist": {"#text": "Low"},
                    "name": "Words",
                    "date": {"uts": "100", "#text": "01 Jan 1970, 00:01"}
                },
                "@attr": {"page": "1", "totalPages": "1"}
            }
        });

        let page = parse_recent_tracks(body).unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].track_name, "Words");
    }

    #[test]
    fn test_parse_empty_history() {
        let body = json!({
            "recenttracks": {"track": [], "@attr": {"page": "1", "totalPages": "0"}}
        });
        let page = parse_recent_tracks(body).unwrap();
        assert_eq!(page.total_pages, 0);
        assert!(page.events.is_empty());
    }

    #[test]
    fn test_api_error_body() {
        let err = parse_recent_tracks(json!({"error": 29, "message": "Rate limit exceeded"}))
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::RateLimited);

        let err = parse_recent_tracks(json!({"error": 10, "message": "Invalid API key"}))
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Client(400));
    }

    #[test]
    fn test_parse_artist_info() {
        let body = json!({
            "artist": {
                "name": "Portishead",
                "mbid": "8f6bd1e4",
                "tags": {"tag": [{"name": "trip-hop"}, {"name": "electronic"}]},
                "bio": {"summary": "Bristol band. <a href=\"https://www.last.fm/music/Portishead\">Read more on Last.fm</a>"}
            }
        });

        let info = parse_artist_info(body).unwrap().unwrap();
        assert_eq!(info.name, "Portishead");
        assert_eq!(info.tags, vec!["trip-hop", "electronic"]);
        assert_eq!(info.bio.as_deref(), Some("Bristol band."));
    }

    #[test]
    fn test_parse_artist_info_unknown_artist() {
        let body = json!({"error": 6, "message": "The artist you supplied could not be found"});
        assert_eq!(parse_artist_info(body).unwrap(), None);
    }
}
