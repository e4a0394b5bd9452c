//! In-memory multiversion container

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::VersionedContainer;
use crate::transaction::CommittedTransaction;
use crate::version::{GmuVersion, VersionGenerator};

/// One version of one key. `value == None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub version: GmuVersion,
    pub sub_version: u32,
    pub value: Option<Vec<u8>>,
}

/// Key → versions, ascending by (local component, sub version).
pub struct InMemoryDataContainer {
    generator: Arc<dyn VersionGenerator>,
    entries: RwLock<HashMap<String, Vec<StoredValue>>>,
}

impl InMemoryDataContainer {
    pub fn new(generator: Arc<dyn VersionGenerator>) -> Self {
        Self {
            generator,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn order_key(&self, value: &StoredValue) -> (u64, u32) {
        (self.generator.this_node_value(&value.version), value.sub_version)
    }

    /// Apply the write set of a committed transaction.
    pub fn apply(&self, committed: &CommittedTransaction) {
        let mut entries = self.entries.write();
        for op in &committed.write_set {
            let stored = StoredValue {
                version: committed.version.clone(),
                sub_version: committed.sub_version,
                value: op.value.clone(),
            };
            let key = self.order_key(&stored);
            let versions = entries.entry(op.key.clone()).or_default();
            let at = versions.partition_point(|v| self.order_key(v) <= key);
            versions.insert(at, stored);
        }
    }

    /// Newest value of `key` visible to a snapshot at `snapshot`.
    pub fn read(&self, key: &str, snapshot: &GmuVersion) -> Option<Vec<u8>> {
        let bound = self.generator.this_node_value(snapshot);
        let entries = self.entries.read();
        let versions = entries.get(key)?;
        versions
            .iter()
            .rev()
            .find(|v| self.generator.this_node_value(&v.version) <= bound)
            .and_then(|v| v.value.clone())
    }

    /// All stored versions of `key`, oldest first.
    pub fn versions(&self, key: &str) -> Vec<StoredValue> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of keys with at least one stored version.
    pub fn key_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Number of stored versions over every key.
    pub fn value_count(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }
}

impl VersionedContainer for InMemoryDataContainer {
    fn gc(&self, minimum: &GmuVersion) -> usize {
        let bound = self.generator.this_node_value(minimum);
        let mut removed = 0;
        let mut entries = self.entries.write();

        entries.retain(|_, versions| {
            let at = versions.partition_point(|v| self.generator.this_node_value(&v.version) <= bound);
            if at > 1 {
                versions.drain(..at - 1);
                removed += at - 1;
            }
            let only_tombstone = versions.len() == 1
                && versions[0].value.is_none()
                && self.generator.this_node_value(&versions[0].version) <= bound;
            if only_tombstone {
                removed += 1;
            }
            !only_tombstone
        });

        removed
    }
}
