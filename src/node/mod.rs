//! GmuNode - one node's commit and GC components wired together
//!
//! The node owns its commit log, data and L1 containers, commit manager
//! and GC manager, and joins a [`LocalCluster`] as both GC request
//! handler and view listener.

mod simulation;

pub use simulation::{simulate, SimulationOptions, SimulationReport};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cluster::{
    ClusterView, GcRequestHandler, LocalCluster, NodeAddress, ViewListener, ViewRegistry,
};
use crate::commit::{CommitListener, QueueOptions, TransactionCommitManager};
use crate::commit_log::{CommitLog, InMemoryCommitLog};
use crate::config::GmuConfig;
use crate::container::{InMemoryDataContainer, VersionedContainer};
use crate::gc::{GarbageCollectorManager, GcContext, GcResult};
use crate::observability::{log_event_with_fields, Event, GmuMetrics};
use crate::transaction::{
    CommittedTransaction, GmuTransaction, LiveTransactions, TransactionIdFactory,
};
use crate::version::{VectorVersionGenerator, VersionGenerator};

pub struct GmuNode {
    address: NodeAddress,
    generator: Arc<VectorVersionGenerator>,
    commit_log: Arc<InMemoryCommitLog>,
    data: Arc<InMemoryDataContainer>,
    l1: Arc<InMemoryDataContainer>,
    views: Arc<ViewRegistry>,
    metrics: Arc<GmuMetrics>,
    manager: TransactionCommitManager,
    gc: Arc<GarbageCollectorManager>,
    ids: TransactionIdFactory,
    /// Local components in application order; held while draining so
    /// claimed batches are applied in queue order
    applied: Mutex<Vec<u64>>,
}

impl GmuNode {
    /// Create a node and register it with `cluster`. The node gets its
    /// position once the caller installs a view that contains it.
    pub fn join(cluster: &Arc<LocalCluster>, config: GmuConfig) -> Arc<Self> {
        let address = NodeAddress::random();
        let generator = Arc::new(VectorVersionGenerator::new(0, 0, 1));
        let dyn_generator: Arc<dyn VersionGenerator> = Arc::clone(&generator) as _;

        let commit_log = Arc::new(InMemoryCommitLog::new(Arc::clone(&dyn_generator)));
        let data = Arc::new(InMemoryDataContainer::new(Arc::clone(&dyn_generator)));
        let l1 = Arc::new(InMemoryDataContainer::new(Arc::clone(&dyn_generator)));
        let live = Arc::new(LiveTransactions::new());
        let views = Arc::new(ViewRegistry::new());
        let metrics = Arc::new(GmuMetrics::new());

        let manager = TransactionCommitManager::new(
            Arc::clone(&dyn_generator),
            Arc::clone(&commit_log) as Arc<dyn CommitLog>,
            Arc::clone(&live),
            Arc::clone(&metrics),
            QueueOptions {
                track_waiting: config.track_waiting,
            },
        );

        let gc = Arc::new(GarbageCollectorManager::new(
            config,
            GcContext {
                generator: dyn_generator,
                commit_log: Arc::clone(&commit_log) as Arc<dyn CommitLog>,
                data_container: Arc::clone(&data) as Arc<dyn VersionedContainer>,
                l1_container: Arc::clone(&l1) as Arc<dyn VersionedContainer>,
                live,
                transport: Arc::new(cluster.transport(address)),
                views: Arc::clone(&views),
                metrics: Arc::clone(&metrics),
            },
        ));
        manager.set_commit_listener(Arc::clone(&gc) as Arc<dyn CommitListener>);

        let node = Arc::new(Self {
            address,
            generator,
            commit_log,
            data,
            l1,
            views,
            metrics,
            manager,
            gc,
            ids: TransactionIdFactory::new(address),
            applied: Mutex::new(Vec::new()),
        });

        let handler = Arc::clone(&node.gc) as Arc<dyn GcRequestHandler>;
        let listener = Arc::clone(&node) as Arc<dyn ViewListener>;
        cluster.register(address, Arc::downgrade(&handler), Arc::downgrade(&listener));
        node
    }

    /// Start the background collectors.
    pub fn start(&self) -> GcResult<()> {
        self.gc.start()?;
        log_event_with_fields(
            Event::NodeStarted,
            &[
                ("node", &self.address.to_string()),
                ("workers", &self.gc.running_workers().join(",")),
            ],
        );
        Ok(())
    }

    pub fn shutdown(&self) {
        self.gc.shutdown();
        log_event_with_fields(Event::NodeStopped, &[("node", &self.address.to_string())]);
    }

    /// Begin a local transaction pinned at the current visible version.
    pub fn begin(&self) -> Arc<GmuTransaction> {
        self.manager.begin_transaction(self.ids.next_id())
    }

    /// Release the snapshot pinned by `transaction`.
    pub fn finish(&self, transaction: &GmuTransaction) {
        self.manager.finish_transaction(&transaction.gtx());
    }

    /// Prepare `transaction`, queueing it when it has writes.
    pub fn prepare(&self, transaction: &Arc<GmuTransaction>) {
        if transaction.has_modifications() {
            self.manager.prepare_transaction(transaction);
        } else {
            self.manager.prepare_read_only_transaction(transaction);
        }
    }

    /// Apply the ready prefix to the data container and publish it.
    /// Returns the applied transactions in application order.
    pub fn apply_ready(&self) -> Vec<CommittedTransaction> {
        let mut applied = self.applied.lock();
        let entries: Vec<_> = self
            .manager
            .get_transactions_to_commit()
            .into_iter()
            .filter(|entry| entry.committing())
            .collect();
        if entries.is_empty() {
            return Vec::new();
        }

        let committed: Vec<CommittedTransaction> =
            entries.iter().map(|e| e.to_committed_transaction()).collect();
        for tx in &committed {
            self.data.apply(tx);
            applied.push(self.generator.this_node_value(&tx.version));
        }
        self.manager.transaction_committed(committed.clone(), entries);
        committed
    }

    /// Local components of every applied transaction, in application order.
    pub fn applied_sequence(&self) -> Vec<u64> {
        self.applied.lock().clone()
    }

    /// Cache a value read from its owner in the L1 container.
    pub fn cache_in_l1(&self, committed: &CommittedTransaction) {
        self.l1.apply(committed);
    }

    /// Read `key` at the snapshot of `transaction`.
    pub fn read(&self, transaction: &GmuTransaction, key: &str) -> Option<Vec<u8>> {
        self.data.read(key, transaction.read_version())
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn manager(&self) -> &TransactionCommitManager {
        &self.manager
    }

    pub fn gc(&self) -> &Arc<GarbageCollectorManager> {
        &self.gc
    }

    pub fn generator(&self) -> &Arc<VectorVersionGenerator> {
        &self.generator
    }

    pub fn commit_log(&self) -> &Arc<InMemoryCommitLog> {
        &self.commit_log
    }

    pub fn data_container(&self) -> &Arc<InMemoryDataContainer> {
        &self.data
    }

    pub fn l1_container(&self) -> &Arc<InMemoryDataContainer> {
        &self.l1
    }

    pub fn views(&self) -> &Arc<ViewRegistry> {
        &self.views
    }

    pub fn metrics(&self) -> &Arc<GmuMetrics> {
        &self.metrics
    }
}

impl ViewListener for GmuNode {
    fn view_installed(&self, view: &ClusterView) {
        if let Some(index) = view.index_of(&self.address) {
            self.generator
                .on_view_installed(view.view_id(), index, view.members().len());
        }
        self.views.install(view.clone());
        self.gc.on_view_changed(view);
    }
}
