//! Commit and GC counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; values are diagnostic

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the commit manager, queue and GC manager of one node.
#[derive(Debug, Default)]
pub struct GmuMetrics {
    prepared: AtomicU64,
    read_only_prepared: AtomicU64,
    commits: AtomicU64,
    read_only_commits: AtomicU64,
    rollbacks: AtomicU64,
    duplicate_prepares: AtomicU64,
    transactions_committed: AtomicU64,
    waits: AtomicU64,
    wait_micros: AtomicU64,
    version_gc_cycles: AtomicU64,
    version_gc_failures: AtomicU64,
    l1_gc_cycles: AtomicU64,
    l1_gc_failures: AtomicU64,
    view_gc_cycles: AtomicU64,
    view_gc_failures: AtomicU64,
    values_collected: AtomicU64,
}

impl GmuMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_prepared(&self) {
        self.prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_only_prepared(&self) {
        self.read_only_prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_only_commits(&self) {
        self.read_only_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicate_prepares(&self) {
        self.duplicate_prepares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_transactions_committed(&self, count: u64) {
        self.transactions_committed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one blocking wait on a ready latch
    pub fn record_wait(&self, micros: u64) {
        self.waits.fetch_add(1, Ordering::Relaxed);
        self.wait_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn increment_version_gc_cycles(&self) {
        self.version_gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_version_gc_failures(&self) {
        self.version_gc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_l1_gc_cycles(&self) {
        self.l1_gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_l1_gc_failures(&self) {
        self.l1_gc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_view_gc_cycles(&self) {
        self.view_gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_view_gc_failures(&self) {
        self.view_gc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_values_collected(&self, count: u64) {
        self.values_collected.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prepared: self.prepared.load(Ordering::Relaxed),
            read_only_prepared: self.read_only_prepared.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            duplicate_prepares: self.duplicate_prepares.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            wait_micros: self.wait_micros.load(Ordering::Relaxed),
            version_gc_cycles: self.version_gc_cycles.load(Ordering::Relaxed),
            version_gc_failures: self.version_gc_failures.load(Ordering::Relaxed),
            l1_gc_cycles: self.l1_gc_cycles.load(Ordering::Relaxed),
            l1_gc_failures: self.l1_gc_failures.load(Ordering::Relaxed),
            view_gc_cycles: self.view_gc_cycles.load(Ordering::Relaxed),
            view_gc_failures: self.view_gc_failures.load(Ordering::Relaxed),
            values_collected: self.values_collected.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub prepared: u64,
    pub read_only_prepared: u64,
    pub commits: u64,
    pub read_only_commits: u64,
    pub rollbacks: u64,
    pub duplicate_prepares: u64,
    pub transactions_committed: u64,
    pub waits: u64,
    pub wait_micros: u64,
    pub version_gc_cycles: u64,
    pub version_gc_failures: u64,
    pub l1_gc_cycles: u64,
    pub l1_gc_failures: u64,
    pub view_gc_cycles: u64,
    pub view_gc_failures: u64,
    pub values_collected: u64,
}
