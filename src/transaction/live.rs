//! Registry of live local transactions and the versions they pin

use dashmap::DashMap;
use parking_lot::RwLock;

use super::id::GlobalTransactionId;
use crate::version::{GmuVersion, VersionGenerator};

/// Live local transactions, keyed by id, with their read versions.
///
/// A registered read version must stay readable: no GC may delete a
/// value needed by a snapshot at that version.
/// Registration and the minimum computation exclude each other: a read
/// version taken before a minimum was computed is always part of it.
#[derive(Debug, Default)]
pub struct LiveTransactions {
    live: DashMap<GlobalTransactionId, GmuVersion>,
    gate: RwLock<()>,
}

impl LiveTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, gtx: GlobalTransactionId, read_version: GmuVersion) {
        let _gate = self.gate.read();
        self.live.insert(gtx, read_version);
    }

    /// Read the snapshot with `read_version` and register it in one step.
    pub fn register_with(
        &self,
        gtx: GlobalTransactionId,
        read_version: impl FnOnce() -> GmuVersion,
    ) -> GmuVersion {
        let _gate = self.gate.read();
        let version = read_version();
        self.live.insert(gtx, version.clone());
        version
    }

    pub fn unregister(&self, gtx: &GlobalTransactionId) -> bool {
        self.live.remove(gtx).is_some()
    }

    pub fn contains(&self, gtx: &GlobalTransactionId) -> bool {
        self.live.contains_key(gtx)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Merge-and-min of every live read version, or `fallback` when no
    /// transaction is live.
    pub fn minimum_visible_version(
        &self,
        generator: &dyn VersionGenerator,
        fallback: impl FnOnce() -> GmuVersion,
    ) -> GmuVersion {
        let _gate = self.gate.write();
        let fallback = fallback();
        let pinned: Vec<GmuVersion> = self.live.iter().map(|e| e.value().clone()).collect();
        generator.merge_and_min(&pinned).unwrap_or(fallback)
    }
}
