mod backfill;
mod classify;
mod controller;
mod dedupe;

pub use backfill::{backfill_unresolved, BackfillReport};
pub use classify::{classify, order_for_review, MatchClass};
pub use controller::{SyncController, SyncError, SyncReport};
pub use dedupe::dedupe;
