//! Commit ordering
//!
//! This module provides:
//! - `TransactionEntry` - per-transaction state and wait primitives
//! - `SortedTransactionQueue` - version-ordered queue computing the ready prefix
//! - `TransactionCommitManager` - prepare/commit/drain protocol
//!
//! Writes leave the queue in non-decreasing version order. Entries with
//! an equal local component leave together, ordered by sub version.

mod entry;
mod manager;
mod queue;
mod signal;

pub use entry::TransactionEntry;
pub use manager::{CommitListener, TransactionCommitManager};
pub use queue::{QueueOptions, SortedTransactionQueue};
pub use signal::{CommitNotifier, ReadyLatch};
