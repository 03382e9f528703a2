//! Two-tier compaction of capacity trends
//!
//! Older than the recent window: one observation per host, pool and day, the
//! one closest to that day's mean. Inside the window: the first observation
//! of each series plus every later one that moved by at least the change
//! threshold. Everything else is deleted and the deletion is audited.

pub mod audit;
pub mod compactor;
pub mod deleter;
pub mod reconcile;

pub use audit::{AuditSummary, AuditWriter, DEFAULT_BATCH_SIZE, WriterState};
pub use compactor::{
    CompactionPlan, Compactor, GroupSummary, KeepSet, Partition, PartitionStats, RetentionPolicy,
    closest_to_mean, significant_changes,
};
pub use deleter::{DeleteOutcome, Deleter, DeletionSummary};
pub use reconcile::delete_set;
