//! Incremental scrobble sync.
//!
//! One run fetches every event newer than the account's checkpoint, drops
//! duplicates, resolves each event to catalog entities and commits the rows
//! in small batches. The checkpoint only moves past an event once that event
//! and every older one fetched in the same run have been committed or
//! skipped, so an interrupted run loses nothing.

use super::classify::order_for_review;
use super::dedupe::dedupe;
use crate::catalog::{CatalogStore, NewScrobble};
use crate::config::SyncSettings;
use crate::fetcher::FetchError;
use crate::remote::{PageRequest, ScrobbleEvent, ScrobbleSource};
use crate::resolver::{
    CheckpointDecision, EntityRefs, EntityResolver, ResolutionMode, ResolutionStats,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not fetch the first page of scrobbles: {0}")]
    FirstPageFailed(#[source] FetchError),

    #[error(transparent)]
    Catalog(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub checkpoint_before: i64,
    pub checkpoint_after: i64,
    pub total_pages: u32,
    pub pages_fetched: u32,
    /// A page after the first failed; only older pages were processed.
    pub incomplete_fetch: bool,
    pub events_fetched: usize,
    pub now_playing_skipped: usize,
    /// Events at or below the checkpoint the source returned anyway.
    pub outside_window: usize,
    pub duplicates_removed: usize,
    pub already_present: usize,
    pub inserted: usize,
    /// Inserted rows with no song id.
    pub unresolved: usize,
    pub failed: usize,
    pub aborted: bool,
    pub resolution: ResolutionStats,
}

/// Tracks which fetched events (in chronological order) are settled and
/// derives the highest timestamp below which nothing is pending.
struct Watermark {
    timestamps: Vec<i64>,
    done: Vec<bool>,
    frontier: usize,
}

impl Watermark {
    fn new(timestamps: Vec<i64>) -> Self {
        let done = vec![false; timestamps.len()];
        Self {
            timestamps,
            done,
            frontier: 0,
        }
    }

    fn settle(&mut self, index: usize) {
        self.done[index] = true;
        while self.frontier < self.done.len() && self.done[self.frontier] {
            self.frontier += 1;
        }
    }

    /// Every event with a timestamp at or below the returned value is settled.
    fn value(&self) -> Option<i64> {
        if self.frontier == self.timestamps.len() {
            self.timestamps.last().copied()
        } else if self.frontier == 0 {
            None
        } else {
            Some(self.timestamps[self.frontier] - 1)
        }
    }
}

/// Rows waiting to be committed, with the chronological index of their
/// source event.
type PendingRows = Vec<(usize, NewScrobble)>;

pub struct SyncController<'a, 'r> {
    store: &'a dyn CatalogStore,
    source: &'a dyn ScrobbleSource,
    resolver: &'a mut EntityResolver<'r>,
    settings: SyncSettings,
}

impl<'a, 'r> SyncController<'a, 'r> {
    pub fn new(
        store: &'a dyn CatalogStore,
        source: &'a dyn ScrobbleSource,
        resolver: &'a mut EntityResolver<'r>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            source,
            resolver,
            settings,
        }
    }

    pub fn run(&mut self, account: &str, full_resync: bool) -> Result<SyncReport, SyncError> {
        let run_started = Utc::now().timestamp();
        let mut report = SyncReport::default();

        if full_resync {
            let deleted = self.store.delete_all_scrobbles()?;
            self.store.reset_checkpoint(account)?;
            info!(
                "Full resync requested: removed {} scrobbles and reset the checkpoint",
                deleted
            );
        }

        let checkpoint = self.store.get_checkpoint(account)?;
        report.checkpoint_before = checkpoint;
        report.checkpoint_after = checkpoint;
        let from = (checkpoint > 0).then(|| checkpoint + 1);
        info!(
            "Syncing scrobbles for {} (checkpoint {}, mode {:?})",
            account,
            checkpoint,
            self.resolver.mode()
        );

        let fetched = self.fetch_all(from, run_started, &mut report)?;
        report.events_fetched = fetched.len();

        let mut events = Vec::with_capacity(fetched.len());
        for event in fetched {
            match event.timestamp {
                None => report.now_playing_skipped += 1,
                Some(ts) if checkpoint > 0 && ts <= checkpoint => report.outside_window += 1,
                Some(_) => events.push(event),
            }
        }

        let before_dedupe = events.len();
        let events = dedupe(events);
        report.duplicates_removed = before_dedupe - events.len();

        if events.is_empty() {
            info!("No new scrobbles since checkpoint {}", checkpoint);
        } else {
            self.process(account, &events, &mut report);
        }

        report.resolution = self.resolver.stats();
        info!(
            "Sync finished: {} inserted ({} unresolved), {} already present, {} failed, checkpoint {} -> {}{}",
            report.inserted,
            report.unresolved,
            report.already_present,
            report.failed,
            report.checkpoint_before,
            report.checkpoint_after,
            if report.aborted { " (aborted)" } else { "" }
        );
        Ok(report)
    }

    /// Fetches page 1, then the remaining pages oldest first. If a later
    /// page fails, everything newer than it (page 1 included) is dropped so
    /// the run never leaves a gap below the checkpoint.
    fn fetch_all(
        &self,
        from: Option<i64>,
        to: i64,
        report: &mut SyncReport,
    ) -> Result<Vec<ScrobbleEvent>, SyncError> {
        let request = |page: u32| PageRequest {
            page,
            limit: self.settings.page_limit,
            from,
            to: Some(to),
        };

        let first = self
            .source
            .fetch_page(&request(1))
            .map_err(SyncError::FirstPageFailed)?;
        report.pages_fetched = 1;
        report.total_pages = first.total_pages;
        let total_pages = first.total_pages.max(1);
        debug!(
            "Page 1/{} fetched ({} events)",
            total_pages,
            first.events.len()
        );

        let mut events = Vec::new();
        for page in (2..=total_pages).rev() {
            self.pause();
            match self.source.fetch_page(&request(page)) {
                Ok(fetched) => {
                    debug!(
                        "Page {}/{} fetched ({} events)",
                        page,
                        total_pages,
                        fetched.events.len()
                    );
                    report.pages_fetched += 1;
                    events.extend(fetched.events);
                }
                Err(e) => {
                    warn!(
                        "Page {}/{} failed ({}); processing only the older pages this run",
                        page, total_pages, e
                    );
                    report.incomplete_fetch = true;
                    return Ok(events);
                }
            }
        }

        events.extend(first.events);
        Ok(events)
    }

    fn pause(&self) {
        if self.settings.page_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.settings.page_delay_ms));
        }
    }

    /// `events` must be in chronological order.
    fn process(&mut self, account: &str, events: &[ScrobbleEvent], report: &mut SyncReport) {
        let mut watermark = Watermark::new(
            events
                .iter()
                .map(|e| e.timestamp.unwrap_or_default())
                .collect(),
        );
        let mut order: Vec<usize> = (0..events.len()).collect();
        if self.resolver.mode() == ResolutionMode::Interactive {
            order_for_review(self.store, events, &mut order);
        }

        let total = order.len();
        let batch_size = self.settings.batch_size.max(1);
        let prompt_every = self.settings.prompt_every.max(1);
        let mut pending: PendingRows = Vec::with_capacity(batch_size);
        let mut max_inserted: Option<i64> = None;

        let mut position = 0;
        while position < total {
            let index = order[position];
            let event = &events[index];
            position += 1;

            if self.already_present(event) {
                report.already_present += 1;
                watermark.settle(index);
            } else {
                let ids = self.resolver.resolve_refs(EntityRefs::from(event));
                let row = new_scrobble(event, ids.song_id, ids.album_id, ids.artist_id);
                pending.push((index, row));
                if pending.len() >= batch_size {
                    self.flush(account, &mut pending, &mut watermark, &mut max_inserted, report);
                }
            }

            if position < total
                && position % prompt_every == 0
                && self.resolver.mode() == ResolutionMode::Interactive
            {
                match self.resolver.policy_mut().checkpoint(position, total) {
                    CheckpointDecision::Continue => {}
                    CheckpointDecision::Abort => {
                        info!("Sync aborted by operator after {}/{} events", position, total);
                        report.aborted = true;
                        break;
                    }
                    CheckpointDecision::SwitchToAutomatic => {
                        info!("Switching to automatic resolution for the remaining events");
                        self.resolver.switch_to_automatic();
                        order[position..].sort_unstable();
                    }
                }
            }
        }

        self.flush(account, &mut pending, &mut watermark, &mut max_inserted, report);
    }

    fn already_present(&self, event: &ScrobbleEvent) -> bool {
        let Some(timestamp) = event.timestamp else {
            return false;
        };
        match self
            .store
            .scrobble_exists(&event.artist_name, &event.track_name, timestamp)
        {
            Ok(exists) => exists,
            Err(e) => {
                error!(
                    "Could not check whether '{}' at {} is stored: {}",
                    event.track_name, timestamp, e
                );
                false
            }
        }
    }

    /// Commits the pending rows and advances the checkpoint as far as the
    /// watermark allows, capped at the newest row inserted so far.
    fn flush(
        &self,
        account: &str,
        pending: &mut PendingRows,
        watermark: &mut Watermark,
        max_inserted: &mut Option<i64>,
        report: &mut SyncReport,
    ) {
        if pending.is_empty() {
            return;
        }
        let rows: Vec<NewScrobble> = pending.iter().map(|(_, row)| row.clone()).collect();
        let batch = std::mem::take(pending);

        let outcome = match self.store.insert_scrobble_batch(&rows) {
            Ok(outcome) => outcome,
            Err(e) => {
                // The events stay unsettled, so the checkpoint cannot pass them.
                error!("Failed to commit a batch of {} scrobbles: {}", rows.len(), e);
                report.failed += rows.len();
                return;
            }
        };

        for (position, _id) in &outcome.inserted {
            let (index, row) = &batch[*position];
            watermark.settle(*index);
            report.inserted += 1;
            if row.song_id.is_none() {
                report.unresolved += 1;
            }
            *max_inserted = Some(max_inserted.map_or(row.timestamp, |m| m.max(row.timestamp)));
        }
        for (position, message) in &outcome.failed {
            let (index, row) = &batch[*position];
            warn!(
                "Skipping scrobble '{}' by '{}' at {}: {}",
                row.track_name, row.artist_name, row.timestamp, message
            );
            watermark.settle(*index);
            report.failed += 1;
        }
        debug!(
            "Committed {} scrobbles ({} failed)",
            outcome.inserted.len(),
            outcome.failed.len()
        );

        let (Some(newest), Some(settled)) = (*max_inserted, watermark.value()) else {
            return;
        };
        let target = newest.min(settled);
        if target <= report.checkpoint_after {
            return;
        }
        match self.store.advance_checkpoint(account, target) {
            Ok(checkpoint) => report.checkpoint_after = checkpoint,
            Err(e) => error!("Failed to advance the checkpoint to {}: {}", target, e),
        }
    }
}

fn new_scrobble(
    event: &ScrobbleEvent,
    song_id: Option<i64>,
    album_id: Option<i64>,
    artist_id: Option<i64>,
) -> NewScrobble {
    let timestamp = event.timestamp.unwrap_or_default();
    let date_text = event
        .date_text
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format_date(timestamp));
    NewScrobble {
        track_name: event.track_name.clone(),
        album_name: event.album_name.clone().filter(|a| !a.trim().is_empty()),
        artist_name: event.artist_name.clone(),
        timestamp,
        date_text,
        url: event.url.clone(),
        song_id,
        album_id,
        artist_id,
    }
}

/// Same shape as the scrobble service's own date text, e.g. `18 Oct 2026, 14:02`.
fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%d %b %Y, %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
