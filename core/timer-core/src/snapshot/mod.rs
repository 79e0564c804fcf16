//! Point-in-time backups of the state document.
//!
//! - [`store`]: writing snapshot files and pruning them by age tier
//! - [`scheduler`]: deciding *when* a snapshot is due (pure, no I/O)

pub mod scheduler;
pub mod store;

pub use scheduler::{DueSnapshot, RequestDecision, SnapshotScheduler, PERIODIC_REASON};
pub use store::{
    parse_snapshot_time, plan_retention, PruneStats, SnapshotEntry, SnapshotStore, DEFAULT_TIERS,
};
