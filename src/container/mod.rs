//! Multiversion key/value containers
//!
//! The same in-memory container backs both the data container and the
//! L1 read cache of a node.

mod memory;

pub use memory::{InMemoryDataContainer, StoredValue};

use crate::version::GmuVersion;

/// A container whose obsolete versions can be collected.
pub trait VersionedContainer: Send + Sync {
    /// Delete values no snapshot at or after `minimum` can observe.
    /// Returns the number of values removed.
    fn gc(&self, minimum: &GmuVersion) -> usize;
}
