//! Garbage collection of obsolete versions and view metadata
//!
//! Three independent collectors, each on its own thread:
//! - Version GC: cluster-wide floor, prunes the commit log and the data container
//! - L1 GC: node-local floor, prunes the L1 cache
//! - View GC: coordinator only, purges view metadata nobody references
//!
//! Failures abort one cycle and are retried on the next trigger.

mod errors;
mod manager;
mod worker;

pub use errors::{GcError, GcResult};
pub use manager::{GarbageCollectorManager, GcContext, GcOutcome};
pub use worker::{GcWorker, Wake};
