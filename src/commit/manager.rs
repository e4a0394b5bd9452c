//! TransactionCommitManager - prepare, commit and drain protocol
//!
//! Prepare stamps a tentative version whose local component comes from a
//! node-wide counter; commit replaces it with the final version and the
//! ready prefix of the queue is handed to the caller for application.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::entry::TransactionEntry;
use super::queue::{QueueOptions, SortedTransactionQueue};
use crate::commit_log::CommitLog;
use crate::observability::{trace_event, Event, GmuMetrics};
use crate::transaction::{
    CommittedTransaction, GlobalTransactionId, GmuTransaction, LiveTransactions,
};
use crate::version::{GmuVersion, VersionGenerator};

/// Told how many transactions each drained batch made visible.
pub trait CommitListener: Send + Sync {
    fn notify_committed(&self, count: usize);
}

/// Commit-side entry point of one node.
pub struct TransactionCommitManager {
    queue: SortedTransactionQueue,
    generator: Arc<dyn VersionGenerator>,
    commit_log: Arc<dyn CommitLog>,
    live: Arc<LiveTransactions>,
    metrics: Arc<GmuMetrics>,
    /// Highest local sequence handed out or observed; shared by prepare
    /// and commit
    last_prepared: Mutex<u64>,
    listener: RwLock<Option<Arc<dyn CommitListener>>>,
}

impl TransactionCommitManager {
    pub fn new(
        generator: Arc<dyn VersionGenerator>,
        commit_log: Arc<dyn CommitLog>,
        live: Arc<LiveTransactions>,
        metrics: Arc<GmuMetrics>,
        options: QueueOptions,
    ) -> Self {
        let last_prepared = generator.this_node_value(&commit_log.get_current_version());
        Self {
            queue: SortedTransactionQueue::new(
                Arc::clone(&generator),
                Arc::clone(&metrics),
                options,
            ),
            generator,
            commit_log,
            live,
            metrics,
            last_prepared: Mutex::new(last_prepared),
            listener: RwLock::new(None),
        }
    }

    pub fn set_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Start a local transaction reading from the current visible version.
    /// Its read version stays pinned until `finish_transaction`.
    pub fn begin_transaction(&self, gtx: GlobalTransactionId) -> Arc<GmuTransaction> {
        let read_version = self
            .live
            .register_with(gtx, || self.commit_log.get_current_version());
        Arc::new(GmuTransaction::new(gtx, read_version))
    }

    pub fn finish_transaction(&self, gtx: &GlobalTransactionId) -> bool {
        self.live.unregister(gtx)
    }

    pub fn prepare_transaction(&self, transaction: &Arc<GmuTransaction>) {
        let mut last_prepared = self.last_prepared.lock();
        let current = self.commit_log.get_current_version();
        let clock_before = self.generator.this_node_value(&current);

        let next_seq = (*last_prepared).max(clock_before) + 1;
        *last_prepared = next_seq;

        transaction.set_transaction_version(self.generator.set_node_version(&current, next_seq));
        // Queued under the counter lock: admission order follows sequence order
        self.queue.prepare(Arc::clone(transaction), clock_before);
        self.metrics.increment_prepared();
    }

    pub fn prepare_read_only_transaction(&self, transaction: &GmuTransaction) {
        transaction.set_transaction_version(self.commit_log.get_current_version());
        self.metrics.increment_read_only_prepared();
    }

    /// Record the final version of `gtx`. `None` when nothing was queued
    /// for it; the version then only advances the visible watermark.
    pub fn commit_transaction(
        &self,
        gtx: &GlobalTransactionId,
        version: GmuVersion,
    ) -> Option<Arc<TransactionEntry>> {
        {
            let mut last_prepared = self.last_prepared.lock();
            let seq = self.generator.this_node_value(&version);
            if seq > *last_prepared {
                *last_prepared = seq;
            }
        }

        match self.queue.commit(gtx, version.clone()) {
            Some(entry) => {
                self.metrics.increment_commits();
                Some(entry)
            }
            None => {
                self.commit_log.update_most_recent_version(&version);
                self.metrics.increment_read_only_commits();
                trace_event(
                    Event::CommitWithoutEntry,
                    &[("gtx", &gtx.to_string()), ("version", &version.to_string())],
                );
                None
            }
        }
    }

    /// Ready prefix of the queue, in application order.
    pub fn get_transactions_to_commit(&self) -> Vec<Arc<TransactionEntry>> {
        let mut ready = Vec::new();
        self.queue.populate_to_commit(&mut ready);
        ready
    }

    /// Publish an applied batch: commit log first, then the listener, then
    /// the entries' waiters, then detach from the queue.
    pub fn transaction_committed(
        &self,
        committed: Vec<CommittedTransaction>,
        entries: Vec<Arc<TransactionEntry>>,
    ) {
        let count = committed.len();
        self.commit_log.insert_new_committed_versions(&committed);

        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.notify_committed(count);
        }

        for entry in &entries {
            entry.committed();
        }
        let detached = self.queue.notify_transactions_committed();

        self.metrics.add_transactions_committed(count as u64);
        trace_event(
            Event::TransactionsCommitted,
            &[
                ("count", &count.to_string()),
                ("detached", &detached.to_string()),
            ],
        );
    }

    pub fn rollback_transaction(&self, transaction: &GmuTransaction) {
        let gtx = transaction.gtx();
        if self.queue.rollback(&gtx).is_some() {
            self.metrics.increment_rollbacks();
            trace_event(Event::TransactionRolledBack, &[("gtx", &gtx.to_string())]);
        }
    }

    pub fn last_prepared_version(&self) -> u64 {
        *self.last_prepared.lock()
    }

    pub fn get_transaction_entry(&self, gtx: &GlobalTransactionId) -> Option<Arc<TransactionEntry>> {
        self.queue.get_transaction_entry(gtx)
    }

    pub fn queue(&self) -> &SortedTransactionQueue {
        &self.queue
    }

    pub fn live_transactions(&self) -> &Arc<LiveTransactions> {
        &self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeAddress;
    use crate::commit_log::InMemoryCommitLog;
    use crate::transaction::{TransactionIdFactory, WriteOp};
    use crate::version::VectorVersionGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener(AtomicUsize);

    impl CommitListener for CountingListener {
        fn notify_committed(&self, count: usize) {
            self.0.fetch_add(count, Ordering::SeqCst);
        }
    }

    struct Fixture {
        manager: TransactionCommitManager,
        log: Arc<InMemoryCommitLog>,
        ids: TransactionIdFactory,
    }

    fn fixture() -> Fixture {
        let generator: Arc<dyn VersionGenerator> = Arc::new(VectorVersionGenerator::new(0, 1, 1));
        let log = Arc::new(InMemoryCommitLog::new(Arc::clone(&generator)));
        let manager = TransactionCommitManager::new(
            generator,
            Arc::clone(&log) as Arc<dyn CommitLog>,
            Arc::new(LiveTransactions::new()),
            Arc::new(GmuMetrics::new()),
            QueueOptions::default(),
        );
        Fixture {
            manager,
            log,
            ids: TransactionIdFactory::new(NodeAddress::random()),
        }
    }

    fn v(seq: u64) -> GmuVersion {
        GmuVersion::new(1, 0, vec![seq])
    }

    impl Fixture {
        fn writer(&self) -> Arc<GmuTransaction> {
            let tx = self.manager.begin_transaction(self.ids.next_id());
            tx.add_write(WriteOp::put("k", b"v".to_vec()));
            tx
        }

        fn apply_ready(&self) -> usize {
            let ready = self.manager.get_transactions_to_commit();
            let entries: Vec<_> = ready.into_iter().filter(|e| e.committing()).collect();
            let committed = entries.iter().map(|e| e.to_committed_transaction()).collect();
            let n = entries.len();
            self.manager.transaction_committed(committed, entries);
            n
        }
    }

    #[test]
    fn test_prepare_assigns_increasing_sequence() {
        let f = fixture();
        let t1 = f.writer();
        let t2 = f.writer();
        f.manager.prepare_transaction(&t1);
        f.manager.prepare_transaction(&t2);

        assert_eq!(t1.transaction_version().component(0), 1);
        assert_eq!(t2.transaction_version().component(0), 2);
        assert_eq!(f.manager.last_prepared_version(), 2);
        assert_eq!(f.manager.queue().size(), 2);
    }

    #[test]
    fn test_remote_final_version_advances_counter() {
        let f = fixture();
        let t1 = f.writer();
        f.manager.prepare_transaction(&t1);
        f.manager.commit_transaction(&t1.gtx(), v(40));
        assert_eq!(f.manager.last_prepared_version(), 40);

        let t2 = f.writer();
        f.manager.prepare_transaction(&t2);
        assert_eq!(t2.transaction_version().component(0), 41);
    }

    #[test]
    fn test_read_only_prepare_uses_current_version() {
        let f = fixture();
        f.log.update_most_recent_version(&v(7));
        let tx = f.manager.begin_transaction(f.ids.next_id());
        f.manager.prepare_read_only_transaction(&tx);

        assert_eq!(tx.transaction_version().component(0), 7);
        assert_eq!(f.manager.queue().size(), 0);
    }

    #[test]
    fn test_commit_and_drain_updates_log_and_listener() {
        let f = fixture();
        let listener = Arc::new(CountingListener::default());
        f.manager.set_commit_listener(Arc::clone(&listener) as Arc<dyn CommitListener>);

        let t1 = f.writer();
        f.manager.prepare_transaction(&t1);
        let entry = f.manager.commit_transaction(&t1.gtx(), v(1)).unwrap();
        assert!(entry.is_ready_to_commit());

        assert_eq!(f.apply_ready(), 1);
        assert!(entry.is_committed());
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.log.get_current_version().component(0), 1);
        assert_eq!(f.manager.queue().size(), 0);
    }

    #[test]
    fn test_rollback_removes_entry() {
        let f = fixture();
        let t1 = f.writer();
        f.manager.prepare_transaction(&t1);
        f.manager.rollback_transaction(&t1);
        f.manager.rollback_transaction(&t1);

        assert_eq!(f.manager.queue().size(), 0);
        assert!(f.manager.get_transaction_entry(&t1.gtx()).is_none());
    }

    #[test]
    fn test_live_registration_follows_begin_and_finish() {
        let f = fixture();
        let tx = f.manager.begin_transaction(f.ids.next_id());
        assert!(f.manager.live_transactions().contains(&tx.gtx()));
        assert!(f.manager.finish_transaction(&tx.gtx()));
        assert!(!f.manager.finish_transaction(&tx.gtx()));
    }
}
