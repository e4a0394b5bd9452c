//! Commit log
//!
//! Tracks the most recent visible version and the history of committed
//! versions that snapshot reads and the garbage collectors consult.

mod memory;

pub use memory::InMemoryCommitLog;

use crate::transaction::CommittedTransaction;
use crate::version::{GmuVersion, ViewId};

/// Committed-version history consumed by the commit manager and the GC.
pub trait CommitLog: Send + Sync {
    /// Most recent version visible to new snapshots.
    fn get_current_version(&self) -> GmuVersion;

    /// Fold `version` into the visible watermark (merge-max).
    fn update_most_recent_version(&self, version: &GmuVersion);

    /// Append applied transactions and advance the watermark.
    fn insert_new_committed_versions(&self, committed: &[CommittedTransaction]);

    /// Newest retained version whose local component is at most that of
    /// `version`.
    fn get_available_version_less_than(&self, version: &GmuVersion) -> GmuVersion;

    /// Drop history older than `floor`, keeping the newest entry at or
    /// below it. Returns the version still needed locally, never above
    /// `floor`.
    fn gc_older_versions(&self, floor: &GmuVersion) -> GmuVersion;

    /// Minimum view id referenced by the retained history.
    fn calculate_minimum_view_id(&self) -> ViewId;
}
