//! Raw-row snapshot cache: one JSON snapshot per (source URL, date-from) key,
//! explicit invalidation, and "new since last visit" bookkeeping.

mod error;
pub use error::StoreError;

mod snapshot;
pub use snapshot::{CacheKey, Snapshot, SnapshotStore};
