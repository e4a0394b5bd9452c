//! TransactionEntry - per-transaction state inside the commit queue
//!
//! Lifecycle:
//! prepared → received commit command → ready to commit → committing → committed
//!
//! Status flags are set-once. Position-independent state lives behind a
//! per-entry lock; the list links are owned by the queue and never
//! exposed here.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::signal::{CommitNotifier, ReadyLatch};
use crate::observability::GmuMetrics;
use crate::transaction::{CommittedTransaction, GlobalTransactionId, GmuTransaction};
use crate::version::GmuVersion;

#[derive(Debug)]
struct EntryState {
    version: GmuVersion,
    /// Local-node component of `version`, the queue's sort value
    order_value: u64,
    sub_version: u32,
    received_commit_command: bool,
    ready_to_commit: bool,
    committing: bool,
    committed: bool,
    waited: bool,
    pending_due_to_other_tx: bool,
    created_at: DateTime<Utc>,
    commit_received_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    committed_at: Option<DateTime<Utc>>,
}

/// One in-flight transaction in the commit queue.
#[derive(Debug)]
pub struct TransactionEntry {
    transaction: Arc<GmuTransaction>,
    /// Queue admission order; breaks ties between equal versions
    admission: u64,
    concurrent_clock_number: u64,
    state: Mutex<EntryState>,
    ready: ReadyLatch,
    committed: CommitNotifier,
    wait_metrics: Option<Arc<GmuMetrics>>,
}

impl TransactionEntry {
    pub(crate) fn new(
        transaction: Arc<GmuTransaction>,
        order_value: u64,
        admission: u64,
        concurrent_clock_number: u64,
        wait_metrics: Option<Arc<GmuMetrics>>,
    ) -> Self {
        let version = transaction.transaction_version();
        Self {
            transaction,
            admission,
            concurrent_clock_number,
            state: Mutex::new(EntryState {
                version,
                order_value,
                sub_version: 0,
                received_commit_command: false,
                ready_to_commit: false,
                committing: false,
                committed: false,
                waited: false,
                pending_due_to_other_tx: false,
                created_at: Utc::now(),
                commit_received_at: None,
                ready_at: None,
                committed_at: None,
            }),
            ready: ReadyLatch::new(),
            committed: CommitNotifier::new(),
            wait_metrics,
        }
    }

    pub fn gtx(&self) -> GlobalTransactionId {
        self.transaction.gtx()
    }

    pub fn transaction(&self) -> &Arc<GmuTransaction> {
        &self.transaction
    }

    pub fn version(&self) -> GmuVersion {
        self.state.lock().version.clone()
    }

    pub fn sub_version(&self) -> u32 {
        self.state.lock().sub_version
    }

    pub fn concurrent_clock_number(&self) -> u64 {
        self.concurrent_clock_number
    }

    pub(crate) fn admission(&self) -> u64 {
        self.admission
    }

    /// Sort key: local-node component, then admission order.
    pub(crate) fn position_key(&self) -> (u64, u64) {
        (self.state.lock().order_value, self.admission)
    }

    pub(crate) fn order_value(&self) -> u64 {
        self.state.lock().order_value
    }

    /// Replace the tentative version with the final commit version.
    pub(crate) fn set_commit_version(&self, version: GmuVersion, order_value: u64) {
        self.transaction.set_transaction_version(version.clone());
        let mut state = self.state.lock();
        state.version = version;
        state.order_value = order_value;
        if !state.received_commit_command {
            state.received_commit_command = true;
            state.commit_received_at = Some(Utc::now());
        }
    }

    /// Returns `true` on the first transition.
    pub(crate) fn mark_ready_to_commit(&self, sub_version: u32) -> bool {
        {
            let mut state = self.state.lock();
            if state.ready_to_commit {
                return false;
            }
            state.ready_to_commit = true;
            state.sub_version = sub_version;
            state.pending_due_to_other_tx = false;
            state.ready_at = Some(Utc::now());
        }
        self.ready.release()
    }

    pub(crate) fn set_pending_due_to_other_tx(&self, pending: bool) {
        self.state.lock().pending_due_to_other_tx = pending;
    }

    /// Release every waiter of an entry leaving the queue without being
    /// committed. Woken threads see `is_committed() == false`.
    pub(crate) fn release_waiters(&self) {
        self.ready.release();
        self.committed.notify_all_aborted();
    }

    /// Left the queue uncommitted, through rollback or a replacing prepare.
    pub fn is_aborted(&self) -> bool {
        self.committed.is_aborted()
    }

    pub fn is_received_commit_command(&self) -> bool {
        self.state.lock().received_commit_command
    }

    pub fn is_ready_to_commit(&self) -> bool {
        self.state.lock().ready_to_commit
    }

    pub fn is_pending_due_to_other_tx(&self) -> bool {
        self.state.lock().pending_due_to_other_tx
    }

    pub fn waited(&self) -> bool {
        self.state.lock().waited
    }

    /// Claim the right to apply this entry. `true` exactly once.
    pub fn committing(&self) -> bool {
        let mut state = self.state.lock();
        if state.committing {
            return false;
        }
        state.committing = true;
        true
    }

    pub fn is_committing(&self) -> bool {
        self.state.lock().committing
    }

    /// Mark the entry applied and wake every `await_until_committed`.
    pub fn committed(&self) {
        {
            let mut state = self.state.lock();
            if state.committed {
                return;
            }
            state.committed = true;
            state.committed_at = Some(Utc::now());
        }
        self.committed.notify_all_committed();
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub fn await_until_is_ready_to_commit(&self) {
        if self.ready.is_released() {
            return;
        }
        let started = self.begin_wait();
        self.ready.wait();
        self.end_wait(started);
    }

    /// Returns `false` on timeout; the entry is left untouched.
    pub fn await_until_is_ready_to_commit_timeout(&self, timeout: Duration) -> bool {
        if self.ready.is_released() {
            return true;
        }
        let started = self.begin_wait();
        let released = self.ready.wait_timeout(timeout);
        self.end_wait(started);
        released
    }

    /// Returns once the entry is committed or aborted.
    pub fn await_until_committed(&self) {
        self.committed.wait();
    }

    /// Returns `false` on timeout; the entry is left untouched. A wake-up
    /// may be an abort, see `is_aborted`.
    pub fn await_until_committed_timeout(&self, timeout: Duration) -> bool {
        self.committed.wait_timeout(timeout)
    }

    /// Every blocking wait sets `waited`; timing needs `track_waiting`.
    fn begin_wait(&self) -> Option<Instant> {
        self.state.lock().waited = true;
        self.wait_metrics.as_ref().map(|_| Instant::now())
    }

    fn end_wait(&self, started: Option<Instant>) {
        if let (Some(started), Some(metrics)) = (started, &self.wait_metrics) {
            metrics.record_wait(started.elapsed().as_micros() as u64);
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.state.lock().created_at
    }

    pub fn commit_received_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().commit_received_at
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ready_at
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().committed_at
    }

    /// Snapshot record for the commit log.
    pub fn to_committed_transaction(&self) -> CommittedTransaction {
        let (version, sub_version) = {
            let state = self.state.lock();
            (state.version.clone(), state.sub_version)
        };
        CommittedTransaction {
            gtx: self.gtx(),
            version,
            write_set: self.transaction.write_set(),
            sub_version,
            concurrent_clock_number: self.concurrent_clock_number,
        }
    }
}

impl fmt::Display for TransactionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "{} version={} seq={} sub={} clock={} commit_received={} ready={} committing={} committed={} pending={}",
            self.gtx(),
            state.version,
            state.order_value,
            state.sub_version,
            self.concurrent_clock_number,
            state.received_commit_command,
            state.ready_to_commit,
            state.committing,
            state.committed,
            state.pending_due_to_other_tx,
        )
    }
}
