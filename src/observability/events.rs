//! Observable events of the commit and GC core
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Node lifecycle
    /// Node components wired and GC workers started
    NodeStarted,
    /// Node shutdown complete
    NodeStopped,
    /// Configuration loaded
    ConfigLoaded,

    // Commit queue
    /// A second prepare arrived for an already queued transaction
    PrepareDuplicate,
    /// Commit for a transaction with no queued entry
    CommitWithoutEntry,
    /// Entry moved after receiving its final version
    EntryRepositioned,
    /// Transaction rolled back and removed from the queue
    TransactionRolledBack,
    /// Batch of transactions applied and detached
    TransactionsCommitted,

    // Garbage collection
    /// A member left during a GC gather and was ignored
    GcMemberDeparted,
    /// GC worker thread exited
    GcWorkerStopped,

    // Cluster
    /// New cluster view installed
    ViewInstalled,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::NodeStarted => "GMU_NODE_STARTED",
            Event::NodeStopped => "GMU_NODE_STOPPED",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::PrepareDuplicate => "GMU_PREPARE_DUPLICATE",
            Event::CommitWithoutEntry => "GMU_COMMIT_WITHOUT_ENTRY",
            Event::EntryRepositioned => "GMU_ENTRY_REPOSITIONED",
            Event::TransactionRolledBack => "GMU_ROLLBACK",
            Event::TransactionsCommitted => "GMU_TRANSACTIONS_COMMITTED",

            Event::GcMemberDeparted => "GC_MEMBER_DEPARTED",
            Event::GcWorkerStopped => "GC_WORKER_STOPPED",

            Event::ViewInstalled => "VIEW_INSTALLED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
