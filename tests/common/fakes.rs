//! In-memory stand-ins for the remote services and the operator.

use scrobble_sync::catalog::EntityKind;
use scrobble_sync::fetcher::{FetchError, FetchErrorKind};
use scrobble_sync::remote::{
    MbArtist, MbRecording, MbRelease, MetadataProvider, PageRequest, ScrobbleEvent,
    ScrobblePage, ScrobbleSource,
};
use scrobble_sync::resolver::{CheckpointDecision, ResolutionMode, ResolutionPolicy};
use std::cmp::Reverse;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Scrobble source
// ============================================================================

/// Serves a fixed listening history newest first, honouring `from`, `to`
/// and paging the way the real service does.
pub struct FakeScrobbleSource {
    events: Vec<ScrobbleEvent>,
    now_playing: Option<ScrobbleEvent>,
    failing_pages: Mutex<HashSet<u32>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl FakeScrobbleSource {
    pub fn new(mut events: Vec<ScrobbleEvent>) -> Self {
        events.sort_by_key(|e| Reverse(e.timestamp));
        Self {
            events,
            now_playing: None,
            failing_pages: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Puts a timestamp-less entry at the top of page 1.
    pub fn with_now_playing(mut self, artist: &str, track: &str) -> Self {
        let mut event = super::scrobble_event(artist, track, 0);
        event.timestamp = None;
        self.now_playing = Some(event);
        self
    }

    pub fn fail_page(&self, page: u32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn heal(&self) {
        self.failing_pages.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl ScrobbleSource for FakeScrobbleSource {
    fn fetch_page(&self, request: &PageRequest) -> Result<ScrobblePage, FetchError> {
        self.requests.lock().unwrap().push(*request);
        if self.failing_pages.lock().unwrap().contains(&request.page) {
            return Err(FetchError::new(
                FetchErrorKind::Server(503),
                "service unavailable",
            ));
        }

        let window: Vec<&ScrobbleEvent> = self
            .events
            .iter()
            .filter(|e| {
                let ts = e.timestamp.unwrap_or_default();
                request.from.map_or(true, |from| ts >= from)
                    && request.to.map_or(true, |to| ts <= to)
            })
            .collect();

        let limit = request.limit.max(1) as usize;
        let total_pages = window.len().div_ceil(limit) as u32;
        let start = (request.page.max(1) as usize - 1) * limit;
        let mut events: Vec<ScrobbleEvent> = window
            .into_iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        if request.page == 1 {
            if let Some(now_playing) = &self.now_playing {
                events.insert(0, now_playing.clone());
            }
        }

        Ok(ScrobblePage {
            page: request.page,
            total_pages,
            events,
        })
    }
}

// ============================================================================
// Metadata provider
// ============================================================================

/// Answers from fixed records and counts every request it receives.
#[derive(Default)]
pub struct FakeMetadataProvider {
    artists: Vec<MbArtist>,
    releases: Vec<MbRelease>,
    recordings: Vec<MbRecording>,
    calls: AtomicUsize,
}

impl FakeMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artist(mut self, id: &str, name: &str, tags: &[&str]) -> Self {
        self.artists.push(MbArtist {
            id: id.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            url: None,
        });
        self
    }

    pub fn with_release(mut self, id: &str, title: &str, artist: &str, date: &str) -> Self {
        self.releases.push(MbRelease {
            id: id.to_string(),
            title: title.to_string(),
            artist_name: Some(artist.to_string()),
            date: Some(date.to_string()),
            track_count: Some(10),
        });
        self
    }

    pub fn with_recording(mut self, id: &str, title: &str, artist: &str, length_ms: i64) -> Self {
        self.recordings.push(MbRecording {
            id: id.to_string(),
            title: title.to_string(),
            artist_name: Some(artist.to_string()),
            length_ms: Some(length_ms),
            tags: vec![],
            releases: vec![],
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn same_artist(credit: &Option<String>, artist: &str) -> bool {
    credit
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(artist))
}

impl MetadataProvider for FakeMetadataProvider {
    fn lookup_artist(&self, mbid: &str) -> Option<MbArtist> {
        self.count();
        self.artists.iter().find(|a| a.id == mbid).cloned()
    }

    fn search_artists(&self, _name: &str) -> Option<Vec<MbArtist>> {
        self.count();
        Some(self.artists.clone())
    }

    fn lookup_release(&self, mbid: &str) -> Option<MbRelease> {
        self.count();
        self.releases.iter().find(|r| r.id == mbid).cloned()
    }

    fn search_releases(&self, _title: &str, artist: &str) -> Option<Vec<MbRelease>> {
        self.count();
        Some(
            self.releases
                .iter()
                .filter(|r| same_artist(&r.artist_name, artist))
                .cloned()
                .collect(),
        )
    }

    fn lookup_recording(&self, mbid: &str) -> Option<MbRecording> {
        self.count();
        self.recordings.iter().find(|r| r.id == mbid).cloned()
    }

    fn search_recordings(
        &self,
        _title: &str,
        artist: &str,
        _album: Option<&str>,
    ) -> Option<Vec<MbRecording>> {
        self.count();
        Some(
            self.recordings
                .iter()
                .filter(|r| same_artist(&r.artist_name, artist))
                .cloned()
                .collect(),
        )
    }
}

// ============================================================================
// Operator
// ============================================================================

/// Interactive policy with canned checkpoint answers. Accepts every manual
/// creation and fuzzy match, and records each checkpoint prompt.
pub struct ScriptedPolicy {
    decisions: VecDeque<CheckpointDecision>,
    prompts: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl ScriptedPolicy {
    /// Returns the policy and a handle to the `(processed, total)` pairs it
    /// was prompted with. Once the script runs out it answers `Continue`.
    pub fn new(decisions: &[CheckpointDecision]) -> (Self, Arc<Mutex<Vec<(usize, usize)>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let policy = Self {
            decisions: decisions.iter().copied().collect(),
            prompts: prompts.clone(),
        };
        (policy, prompts)
    }
}

impl ResolutionPolicy for ScriptedPolicy {
    fn mode(&self) -> ResolutionMode {
        ResolutionMode::Interactive
    }

    fn confirm_manual(&mut self, _kind: EntityKind, _description: &str) -> bool {
        true
    }

    fn confirm_fuzzy_match(&mut self, _: EntityKind, _: &str, _: &str, _: f64) -> bool {
        true
    }

    fn checkpoint(&mut self, processed: usize, total: usize) -> CheckpointDecision {
        self.prompts.lock().unwrap().push((processed, total));
        self.decisions
            .pop_front()
            .unwrap_or(CheckpointDecision::Continue)
    }

    fn notify(&mut self, _message: &str) {}
}
