//! Collapses catalog rows that share a MusicBrainz id.
//!
//! Duplicates appear when the same entity was created under two spellings
//! before either had an MBID. The lowest id of each group is kept and every
//! reference to the others is re-pointed at it.

use crate::catalog::{CatalogStore, EntityKind};
use anyhow::Result;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.artists + self.albums + self.songs
    }
}

pub struct DuplicateMergeReconciler<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> DuplicateMergeReconciler<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    /// Merges every duplicate group of `kind` and returns the number of rows
    /// removed. A row whose merge fails is logged and left in place.
    pub fn merge_by_external_id(&self, kind: EntityKind) -> Result<usize> {
        let groups = self.store.duplicate_mbid_groups(kind)?;
        if groups.is_empty() {
            debug!("No duplicate {}s", kind);
            return Ok(0);
        }

        let mut merged = 0;
        for (mbid, ids) in groups {
            let Some((&canonical, duplicates)) = ids.split_first() else {
                continue;
            };
            for &duplicate in duplicates {
                match self.store.merge_rows(kind, canonical, duplicate) {
                    Ok(()) => {
                        debug!(
                            "Merged {} #{} into #{} (MBID {})",
                            kind, duplicate, canonical, mbid
                        );
                        merged += 1;
                    }
                    Err(e) => error!(
                        "Failed to merge {} #{} into #{} (MBID {}): {}",
                        kind, duplicate, canonical, mbid, e
                    ),
                }
            }
        }

        info!("Merged {} duplicate {}s", merged, kind);
        Ok(merged)
    }

    /// Artists first, so album duplicates revealed by re-pointed artists are
    /// caught in the same pass.
    pub fn merge_all(&self) -> Result<MergeReport> {
        Ok(MergeReport {
            artists: self.merge_by_external_id(EntityKind::Artist)?,
            albums: self.merge_by_external_id(EntityKind::Album)?,
            songs: self.merge_by_external_id(EntityKind::Song)?,
        })
    }
}
