//! Garbage collection errors
//!
//! Every error aborts the current cycle only. Nothing is pruned by an
//! aborted cycle and the next trigger starts over.

use thiserror::Error;

use crate::cluster::NodeAddress;

/// Result type for GC cycles
pub type GcResult<T> = Result<T, GcError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    #[error("GC transport failure from {member}: {reason}")]
    Transport { member: NodeAddress, reason: String },

    #[error("GC member {member} did not answer within {timeout_ms}ms")]
    Timeout { member: NodeAddress, timeout_ms: u64 },

    #[error("GC cycle interrupted by shutdown")]
    Interrupted,

    #[error("No version available: {0}")]
    NoVersion(String),

    #[error("Failed to start GC worker {name}: {reason}")]
    WorkerSpawn { name: String, reason: String },
}
