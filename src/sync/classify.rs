//! Pre-classification of fetched events against the local catalog.
//!
//! Interactive runs work through the events that need the least operator
//! attention first, so the questions come in one block at the end.

use crate::catalog::CatalogStore;
use crate::remote::ScrobbleEvent;
use anyhow::Result;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchClass {
    /// The song is already in the catalog.
    FullyMatched,
    /// The artist (or album) is known but the song is not.
    PartiallyMatched,
    Unmatched,
}

pub fn classify(store: &dyn CatalogStore, event: &ScrobbleEvent) -> Result<MatchClass> {
    let artist_name = event.artist_name.trim();
    let track_name = event.track_name.trim();
    let album_name = event
        .album_name
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    if store.find_song(track_name, artist_name, album_name)?.is_some() {
        return Ok(MatchClass::FullyMatched);
    }
    if let Some(mbid) = event.track_mbid.as_deref().filter(|m| !m.is_empty()) {
        if store.find_song_by_mbid(mbid)?.is_some() {
            return Ok(MatchClass::FullyMatched);
        }
    }

    let artist = match store.find_artist_by_name(artist_name)? {
        Some(artist) => Some(artist),
        None => match event.artist_mbid.as_deref().filter(|m| !m.is_empty()) {
            Some(mbid) => store.find_artist_by_mbid(mbid)?,
            None => None,
        },
    };
    if artist.is_some() {
        return Ok(MatchClass::PartiallyMatched);
    }

    Ok(MatchClass::Unmatched)
}

/// Stable reorder of `indices` (into `events`): fully matched, then partially
/// matched, then unmatched. An event that cannot be classified is treated as
/// unmatched.
pub fn order_for_review(
    store: &dyn CatalogStore,
    events: &[ScrobbleEvent],
    indices: &mut [usize],
) {
    let classes: Vec<MatchClass> = events
        .iter()
        .map(|event| {
            classify(store, event).unwrap_or_else(|e| {
                warn!(
                    "Could not classify '{}' by '{}': {}",
                    event.track_name, event.artist_name, e
                );
                MatchClass::Unmatched
            })
        })
        .collect();
    indices.sort_by_key(|&i| classes[i]);
}
