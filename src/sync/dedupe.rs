use crate::remote::ScrobbleEvent;
use std::collections::HashSet;

/// Keeps only the most recent event per (artist, track), compared
/// case-insensitively, and returns the survivors oldest first.
///
/// Events without a timestamp sort as the oldest; callers drop the
/// now-playing entry before getting here.
pub fn dedupe(mut events: Vec<ScrobbleEvent>) -> Vec<ScrobbleEvent> {
    events.sort_by_key(|e| std::cmp::Reverse(e.timestamp.unwrap_or(i64::MIN)));

    let mut seen = HashSet::new();
    events.retain(|e| seen.insert((e.artist_name.to_lowercase(), e.track_name.to_lowercase())));

    events.sort_by_key(|e| e.timestamp.unwrap_or(i64::MIN));
    events
}
