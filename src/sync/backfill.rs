use crate::catalog::{CatalogStore, Scrobble};
use crate::resolver::{EntityRefs, EntityResolver};
use anyhow::Result;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub examined: usize,
    /// Rows that now have a song id.
    pub resolved: usize,
    /// Rows that gained an artist or album id but still lack a song.
    pub partially_resolved: usize,
    pub still_unresolved: usize,
}

/// Re-runs resolution for every stored scrobble that has no song id and
/// fills in whatever ids resolve now. Ids already set are kept.
///
/// Rows are read `page_size` at a time behind an id cursor, so rows that
/// stay unresolved never hide newer ones.
pub fn backfill_unresolved(
    store: &dyn CatalogStore,
    resolver: &mut EntityResolver,
    page_size: usize,
) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();
    let mut cursor = 0;

    loop {
        let page = store.unresolved_scrobbles(cursor, page_size.max(1))?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = last.id;
        for scrobble in &page {
            backfill_one(store, resolver, scrobble, &mut report);
        }
    }

    info!(
        "Backfill examined {} scrobbles: {} resolved, {} partially, {} still unresolved",
        report.examined, report.resolved, report.partially_resolved, report.still_unresolved
    );
    Ok(report)
}

fn backfill_one(
    store: &dyn CatalogStore,
    resolver: &mut EntityResolver,
    scrobble: &Scrobble,
    report: &mut BackfillReport,
) {
    report.examined += 1;
    let ids = resolver.resolve_refs(EntityRefs {
        artist_name: &scrobble.artist_name,
        artist_mbid: None,
        album_name: scrobble.album_name.as_deref(),
        album_mbid: None,
        track_name: &scrobble.track_name,
        track_mbid: None,
    });

    let gains_artist = scrobble.artist_id.is_none() && ids.artist_id.is_some();
    let gains_album = scrobble.album_id.is_none() && ids.album_id.is_some();
    if ids.song_id.is_none() && !gains_artist && !gains_album {
        report.still_unresolved += 1;
        return;
    }

    match store.backfill_scrobble_ids(scrobble.id, ids.song_id, ids.album_id, ids.artist_id) {
        Ok(_) if ids.song_id.is_some() => report.resolved += 1,
        Ok(_) => {
            report.partially_resolved += 1;
            report.still_unresolved += 1;
        }
        Err(e) => {
            warn!("Failed to update scrobble #{}: {}", scrobble.id, e);
            report.still_unresolved += 1;
        }
    }
}
