//! In-memory commit log

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::CommitLog;
use crate::transaction::CommittedTransaction;
use crate::version::{GmuVersion, VersionGenerator, ViewId};

#[derive(Debug, Clone)]
struct LogEntry {
    version: GmuVersion,
    sub_version: u32,
}

#[derive(Debug)]
struct LogState {
    current: GmuVersion,
    /// Ascending by (local component, sub version)
    history: Vec<LogEntry>,
    /// Oldest version still answerable after the last prune
    floor: GmuVersion,
}

/// Commit log kept entirely in memory.
pub struct InMemoryCommitLog {
    generator: Arc<dyn VersionGenerator>,
    state: Mutex<LogState>,
    advanced: Condvar,
}

impl InMemoryCommitLog {
    pub fn new(generator: Arc<dyn VersionGenerator>) -> Self {
        let zero = generator.zero();
        Self {
            state: Mutex::new(LogState {
                current: zero.clone(),
                history: Vec::new(),
                floor: zero,
            }),
            generator,
            advanced: Condvar::new(),
        }
    }

    fn local(&self, version: &GmuVersion) -> u64 {
        self.generator.this_node_value(version)
    }

    fn merge_into_current(&self, state: &mut LogState, version: &GmuVersion) {
        if let Some(merged) = self
            .generator
            .merge_and_max(&[state.current.clone(), version.clone()])
        {
            state.current = merged;
        }
    }

    /// Block until the watermark's local component reaches `local_seq`.
    /// Returns `false` on timeout.
    pub fn wait_for_version(&self, local_seq: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while self.local(&state.current) < local_seq {
            if self.advanced.wait_until(&mut state, deadline).timed_out() {
                return self.local(&state.current) >= local_seq;
            }
        }
        true
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Local components of the retained history, oldest first.
    pub fn history_sequence(&self) -> Vec<u64> {
        self.state
            .lock()
            .history
            .iter()
            .map(|e| self.local(&e.version))
            .collect()
    }
}

impl CommitLog for InMemoryCommitLog {
    fn get_current_version(&self) -> GmuVersion {
        self.state.lock().current.clone()
    }

    fn update_most_recent_version(&self, version: &GmuVersion) {
        let mut state = self.state.lock();
        self.merge_into_current(&mut state, version);
        self.advanced.notify_all();
    }

    fn insert_new_committed_versions(&self, committed: &[CommittedTransaction]) {
        if committed.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for tx in committed {
            let key = (self.local(&tx.version), tx.sub_version);
            let at = state
                .history
                .partition_point(|e| (self.local(&e.version), e.sub_version) <= key);
            state.history.insert(
                at,
                LogEntry {
                    version: tx.version.clone(),
                    sub_version: tx.sub_version,
                },
            );
            self.merge_into_current(&mut state, &tx.version);
        }
        self.advanced.notify_all();
    }

    fn get_available_version_less_than(&self, version: &GmuVersion) -> GmuVersion {
        let bound = self.local(version);
        let state = self.state.lock();
        let at = state
            .history
            .partition_point(|e| self.local(&e.version) <= bound);
        match at.checked_sub(1) {
            Some(index) => state.history[index].version.clone(),
            None => state.floor.clone(),
        }
    }

    fn gc_older_versions(&self, floor: &GmuVersion) -> GmuVersion {
        let bound = self.local(floor);
        let mut state = self.state.lock();
        let at = state
            .history
            .partition_point(|e| self.local(&e.version) <= bound);
        let keep = match at.checked_sub(1) {
            Some(keep) => keep,
            None => return floor.clone(),
        };

        state.history.drain(..keep);
        let kept = state.history[0].version.clone();
        let needed = self
            .generator
            .merge_and_min(&[kept, floor.clone()])
            .unwrap_or_else(|| floor.clone());
        state.floor = needed.clone();
        needed
    }

    fn calculate_minimum_view_id(&self) -> ViewId {
        let state = self.state.lock();
        state
            .history
            .iter()
            .map(|e| e.version.view_id())
            .fold(state.current.view_id(), ViewId::min)
    }
}
