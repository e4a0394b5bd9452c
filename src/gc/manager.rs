//! GarbageCollectorManager - version, L1 and view garbage collection
//!
//! Invariants:
//! - A floor passed to a container is never above the read version of a
//!   transaction registered as live when the floor was computed
//! - A cycle either completes or prunes nothing
//! - Departed members are ignored; members that time out or fail abort
//!   the cycle

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use super::errors::{GcError, GcResult};
use super::worker::{GcWorker, Wake};
use crate::cluster::{
    ClusterTransport, ClusterView, GcRequest, GcRequestHandler, GcResponse, MemberReply,
    NodeAddress, ViewRegistry,
};
use crate::commit::CommitListener;
use crate::commit_log::CommitLog;
use crate::config::GmuConfig;
use crate::container::VersionedContainer;
use crate::observability::{log_event_with_fields, Event, GmuMetrics, ObservationScope};
use crate::transaction::LiveTransactions;
use crate::version::{GmuVersion, VersionGenerator, ViewId};

/// Result of one completed GC cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GcOutcome {
    /// Versions older than `floor` were collected
    Versions { floor: GmuVersion, removed: usize },
    /// View metadata below `min_view_id` was purged
    Views { min_view_id: ViewId, removed: usize },
    /// Nothing to do on this node
    Skipped { reason: String },
}

/// Collaborators of a [`GarbageCollectorManager`].
pub struct GcContext {
    pub generator: Arc<dyn VersionGenerator>,
    pub commit_log: Arc<dyn CommitLog>,
    pub data_container: Arc<dyn VersionedContainer>,
    pub l1_container: Arc<dyn VersionedContainer>,
    pub live: Arc<LiveTransactions>,
    pub transport: Arc<dyn ClusterTransport>,
    pub views: Arc<ViewRegistry>,
    pub metrics: Arc<GmuMetrics>,
}

#[derive(Default)]
struct Workers {
    version: Option<GcWorker>,
    l1: Option<GcWorker>,
    view: Option<GcWorker>,
}

/// Background garbage collection of one node.
pub struct GarbageCollectorManager {
    config: GmuConfig,
    ctx: GcContext,
    committed_since_last_cycle: AtomicU64,
    view_retry_pending: AtomicBool,
    stop: Arc<AtomicBool>,
    workers: Mutex<Workers>,
}

impl GarbageCollectorManager {
    pub fn new(config: GmuConfig, ctx: GcContext) -> Self {
        Self {
            config,
            ctx,
            committed_since_last_cycle: AtomicU64::new(0),
            view_retry_pending: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Workers::default()),
        }
    }

    /// Start the enabled background collectors.
    ///
    /// L1 GC is not started in fully replicated clusters.
    pub fn start(self: &Arc<Self>) -> GcResult<()> {
        let mut workers = self.workers.lock();

        if self.config.version_gc.enabled && workers.version.is_none() {
            let weak = Arc::downgrade(self);
            workers.version = Some(GcWorker::spawn(
                "version-gc",
                self.config.version_gc_max_idle(),
                Arc::clone(&self.stop),
                move |_| {
                    with_manager(&weak, |m| {
                        let _ = m.run_version_gc();
                    })
                },
            )?);
        }

        if self.config.l1_gc.enabled && !self.config.fully_replicated && workers.l1.is_none() {
            let weak = Arc::downgrade(self);
            workers.l1 = Some(GcWorker::spawn(
                "l1-gc",
                self.config.l1_gc_interval(),
                Arc::clone(&self.stop),
                move |_| {
                    with_manager(&weak, |m| {
                        let _ = m.run_l1_gc();
                    })
                },
            )?);
        }

        if self.config.view_gc.enabled && workers.view.is_none() {
            let weak = Arc::downgrade(self);
            workers.view = Some(GcWorker::spawn(
                "view-gc",
                self.config.view_gc_backoff(),
                Arc::clone(&self.stop),
                move |wake| {
                    with_manager(&weak, |m| {
                        // Idle ticks only matter for a pending retry
                        if wake == Wake::Triggered || m.view_retry_pending.load(Ordering::SeqCst) {
                            let _ = m.run_view_gc();
                        }
                    })
                },
            )?);
        }

        Ok(())
    }

    /// Stop every collector. In-flight cycles abort before deleting.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in [workers.version, workers.l1, workers.view].into_iter().flatten() {
            worker.shutdown();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn running_workers(&self) -> Vec<String> {
        let workers = self.workers.lock();
        [&workers.version, &workers.l1, &workers.view]
            .into_iter()
            .flatten()
            .filter(|w| w.is_running())
            .map(|w| w.name().to_string())
            .collect()
    }

    pub fn committed_since_last_cycle(&self) -> u64 {
        self.committed_since_last_cycle.load(Ordering::SeqCst)
    }

    pub fn trigger_version_gc(&self) {
        if let Some(worker) = &self.workers.lock().version {
            worker.trigger();
        }
    }

    /// Membership changed: the coordinator schedules a view GC.
    pub fn on_view_changed(&self, view: &ClusterView) {
        if !self.config.view_gc.enabled
            || view.coordinator() != Some(self.ctx.transport.local_address())
        {
            return;
        }
        if let Some(worker) = &self.workers.lock().view {
            worker.trigger();
        }
    }

    /// Minimum version pinned by this node's live transactions, or the
    /// current visible version when none is live.
    pub fn local_minimum_visible_version(&self) -> GmuVersion {
        self.ctx
            .live
            .minimum_visible_version(self.ctx.generator.as_ref(), || {
                self.ctx.commit_log.get_current_version()
            })
    }

    fn check_stop(&self) -> GcResult<()> {
        if self.is_stopped() {
            Err(GcError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Turn a non-response into the cycle's error. `Departed` is `None`.
    fn reply_error(&self, member: NodeAddress, reply: MemberReply) -> Option<GcError> {
        match reply {
            MemberReply::Departed => {
                log_event_with_fields(Event::GcMemberDeparted, &[("member", &member.to_string())]);
                None
            }
            MemberReply::TimedOut => Some(GcError::Timeout {
                member,
                timeout_ms: self.config.rpc_timeout_ms,
            }),
            MemberReply::Failed(reason) => Some(GcError::Transport { member, reason }),
            MemberReply::Response(response) => Some(GcError::Transport {
                member,
                reason: format!("unexpected response {:?}", response),
            }),
        }
    }

    /// Cluster-wide floor: merge-and-min of every member's minimum visible
    /// version, self included.
    pub fn gather_cluster_floor(&self) -> GcResult<GmuVersion> {
        let mut minimums = vec![self.local_minimum_visible_version()];

        let replies = self
            .ctx
            .transport
            .broadcast(&GcRequest::MinimumVisibleVersion, self.config.rpc_timeout());
        for (member, reply) in replies {
            match reply {
                MemberReply::Response(GcResponse::MinimumVisibleVersion(version)) => {
                    minimums.push(version)
                }
                other => {
                    if let Some(err) = self.reply_error(member, other) {
                        return Err(err);
                    }
                }
            }
        }

        self.ctx
            .generator
            .merge_and_min(&minimums)
            .ok_or_else(|| GcError::NoVersion("no minimum visible version gathered".into()))
    }

    /// One version GC cycle.
    pub fn run_version_gc(&self) -> GcResult<GcOutcome> {
        let scope = ObservationScope::new("VERSION_GC");
        self.committed_since_last_cycle.store(0, Ordering::SeqCst);

        let result = self.check_stop().and_then(|_| {
            let floor = self.gather_cluster_floor()?;
            self.check_stop()?;
            let needed = self.ctx.commit_log.gc_older_versions(&floor);
            let removed = self.ctx.data_container.gc(&needed);
            Ok((needed, removed))
        });

        match result {
            Ok((floor, removed)) => {
                self.ctx.metrics.increment_version_gc_cycles();
                self.ctx.metrics.add_values_collected(removed as u64);
                scope.complete_with_fields(&[
                    ("floor", &floor.to_string()),
                    ("removed", &removed.to_string()),
                ]);
                Ok(GcOutcome::Versions { floor, removed })
            }
            Err(err) => {
                self.ctx.metrics.increment_version_gc_failures();
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    /// One L1 GC cycle; local only.
    pub fn run_l1_gc(&self) -> GcResult<GcOutcome> {
        if self.config.fully_replicated {
            return Ok(GcOutcome::Skipped {
                reason: "fully replicated".into(),
            });
        }

        let scope = ObservationScope::new("L1_GC");
        let result = self.check_stop().and_then(|_| {
            let floor = self.local_minimum_visible_version();
            self.check_stop()?;
            let removed = self.ctx.l1_container.gc(&floor);
            Ok((floor, removed))
        });

        match result {
            Ok((floor, removed)) => {
                self.ctx.metrics.increment_l1_gc_cycles();
                self.ctx.metrics.add_values_collected(removed as u64);
                scope.complete_with_fields(&[
                    ("floor", &floor.to_string()),
                    ("removed", &removed.to_string()),
                ]);
                Ok(GcOutcome::Versions { floor, removed })
            }
            Err(err) => {
                self.ctx.metrics.increment_l1_gc_failures();
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    /// One view GC cycle. Only the coordinator runs it; a failure leaves a
    /// retry pending for the next back-off tick.
    pub fn run_view_gc(&self) -> GcResult<GcOutcome> {
        if !self.ctx.transport.is_coordinator() {
            self.view_retry_pending.store(false, Ordering::SeqCst);
            return Ok(GcOutcome::Skipped {
                reason: "not coordinator".into(),
            });
        }

        let scope = ObservationScope::new("VIEW_GC");
        match self.check_stop().and_then(|_| self.purge_views()) {
            Ok((min_view_id, removed)) => {
                self.view_retry_pending.store(false, Ordering::SeqCst);
                self.ctx.metrics.increment_view_gc_cycles();
                scope.complete_with_fields(&[
                    ("min_view_id", &min_view_id.to_string()),
                    ("removed", &removed.to_string()),
                ]);
                Ok(GcOutcome::Views {
                    min_view_id,
                    removed,
                })
            }
            Err(err) => {
                self.view_retry_pending.store(true, Ordering::SeqCst);
                self.ctx.metrics.increment_view_gc_failures();
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn purge_views(&self) -> GcResult<(ViewId, usize)> {
        let timeout = self.config.rpc_timeout();
        let mut min_view_id = self.ctx.commit_log.calculate_minimum_view_id();

        for (member, reply) in self
            .ctx
            .transport
            .broadcast(&GcRequest::MinimumViewId, timeout)
        {
            match reply {
                MemberReply::Response(GcResponse::MinimumViewId(view_id)) => {
                    min_view_id = min_view_id.min(view_id)
                }
                other => {
                    if let Some(err) = self.reply_error(member, other) {
                        return Err(err);
                    }
                }
            }
        }
        self.check_stop()?;

        // Purging below the global minimum is safe on any subset of nodes
        let removed = self.ctx.views.gc_unreachable_cache_topology(min_view_id);
        for (member, reply) in self
            .ctx
            .transport
            .broadcast(&GcRequest::PurgeViews { min_view_id }, timeout)
        {
            match reply {
                MemberReply::Response(GcResponse::Ack) => {}
                other => {
                    if let Some(err) = self.reply_error(member, other) {
                        return Err(err);
                    }
                }
            }
        }

        Ok((min_view_id, removed))
    }
}

fn with_manager(weak: &Weak<GarbageCollectorManager>, f: impl FnOnce(&GarbageCollectorManager)) {
    if let Some(manager) = weak.upgrade() {
        f(&manager);
    }
}

impl CommitListener for GarbageCollectorManager {
    fn notify_committed(&self, count: usize) {
        let total = self
            .committed_since_last_cycle
            .fetch_add(count as u64, Ordering::SeqCst)
            + count as u64;
        if total > self.config.version_gc.commit_threshold {
            self.trigger_version_gc();
        }
    }
}

impl GcRequestHandler for GarbageCollectorManager {
    fn handle_gc_request(&self, request: &GcRequest) -> GcResponse {
        match request {
            GcRequest::MinimumVisibleVersion => {
                GcResponse::MinimumVisibleVersion(self.local_minimum_visible_version())
            }
            GcRequest::MinimumViewId => {
                GcResponse::MinimumViewId(self.ctx.commit_log.calculate_minimum_view_id())
            }
            GcRequest::PurgeViews { min_view_id } => {
                self.ctx.views.gc_unreachable_cache_topology(*min_view_id);
                GcResponse::Ack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::LocalCluster;
    use crate::commit_log::InMemoryCommitLog;
    use crate::container::InMemoryDataContainer;
    use crate::transaction::{CommittedTransaction, GlobalTransactionId, WriteOp};
    use crate::version::VectorVersionGenerator;

    struct Single {
        gc: Arc<GarbageCollectorManager>,
        log: Arc<InMemoryCommitLog>,
        data: Arc<InMemoryDataContainer>,
        l1: Arc<InMemoryDataContainer>,
        live: Arc<LiveTransactions>,
        views: Arc<ViewRegistry>,
        address: NodeAddress,
    }

    fn single(config: GmuConfig) -> Single {
        let cluster = LocalCluster::new();
        let address = NodeAddress::random();
        let generator: Arc<dyn VersionGenerator> = Arc::new(VectorVersionGenerator::new(0, 1, 1));
        let log = Arc::new(InMemoryCommitLog::new(Arc::clone(&generator)));
        let data = Arc::new(InMemoryDataContainer::new(Arc::clone(&generator)));
        let l1 = Arc::new(InMemoryDataContainer::new(Arc::clone(&generator)));
        let live = Arc::new(LiveTransactions::new());
        let views = Arc::new(ViewRegistry::new());

        let gc = Arc::new(GarbageCollectorManager::new(
            config,
            GcContext {
                generator,
                commit_log: Arc::clone(&log) as Arc<dyn CommitLog>,
                data_container: Arc::clone(&data) as Arc<dyn VersionedContainer>,
                l1_container: Arc::clone(&l1) as Arc<dyn VersionedContainer>,
                live: Arc::clone(&live),
                transport: Arc::new(cluster.transport(address)),
                views: Arc::clone(&views),
                metrics: Arc::new(GmuMetrics::new()),
            },
        ));
        let handler: Arc<dyn GcRequestHandler> = Arc::clone(&gc) as Arc<dyn GcRequestHandler>;
        let listener: Arc<dyn crate::cluster::ViewListener> = Arc::new(NoopListener);
        cluster.register(address, Arc::downgrade(&handler), Arc::downgrade(&listener));
        let view = cluster.install_view();
        views.install(view);

        Single {
            gc,
            log,
            data,
            l1,
            live,
            views,
            address,
        }
    }

    struct NoopListener;

    impl crate::cluster::ViewListener for NoopListener {
        fn view_installed(&self, _view: &ClusterView) {}
    }

    fn v(seq: u64) -> GmuVersion {
        GmuVersion::new(1, 0, vec![seq])
    }

    fn commit(s: &Single, seq: u64) {
        let tx = CommittedTransaction {
            gtx: GlobalTransactionId::new(s.address, seq),
            version: v(seq),
            write_set: vec![WriteOp::put("k", seq.to_string().into_bytes())],
            sub_version: 0,
            concurrent_clock_number: seq - 1,
        };
        s.log.insert_new_committed_versions(std::slice::from_ref(&tx));
        s.data.apply(&tx);
        s.l1.apply(&tx);
    }

    #[test]
    fn test_version_gc_respects_live_transaction() {
        let s = single(GmuConfig::default());
        for seq in 1..=3 {
            commit(&s, seq);
        }
        s.live.register(GlobalTransactionId::new(s.address, 100), v(2));
        for seq in 4..=6 {
            commit(&s, seq);
        }

        let outcome = s.gc.run_version_gc().unwrap();
        match outcome {
            GcOutcome::Versions { floor, removed } => {
                assert_eq!(floor.component(0), 2);
                assert_eq!(removed, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.data.read("k", &v(2)).as_deref(), Some(&b"2"[..]));
        assert_eq!(s.log.history_len(), 5);
    }

    #[test]
    fn test_version_gc_without_live_uses_current() {
        let s = single(GmuConfig::default());
        for seq in 1..=4 {
            commit(&s, seq);
        }
        s.gc.run_version_gc().unwrap();
        assert_eq!(s.data.value_count(), 1);
        assert_eq!(s.log.history_len(), 1);
    }

    #[test]
    fn test_l1_gc_skipped_when_fully_replicated() {
        let config = GmuConfig {
            fully_replicated: true,
            ..GmuConfig::default()
        };
        let s = single(config);
        commit(&s, 1);
        commit(&s, 2);

        assert!(matches!(s.gc.run_l1_gc().unwrap(), GcOutcome::Skipped { .. }));
        assert_eq!(s.l1.value_count(), 2);

        Arc::clone(&s.gc).start().unwrap();
        assert!(!s.gc.running_workers().contains(&"l1-gc".to_string()));
        s.gc.shutdown();
    }

    #[test]
    fn test_l1_gc_collects_locally() {
        let s = single(GmuConfig::default());
        for seq in 1..=3 {
            commit(&s, seq);
        }
        s.gc.run_l1_gc().unwrap();
        assert_eq!(s.l1.value_count(), 1);
        // the data container is untouched by L1 GC
        assert_eq!(s.data.value_count(), 3);
    }

    #[test]
    fn test_stopped_manager_prunes_nothing() {
        let s = single(GmuConfig::default());
        for seq in 1..=3 {
            commit(&s, seq);
        }
        s.gc.shutdown();

        assert_eq!(s.gc.run_version_gc(), Err(GcError::Interrupted));
        assert_eq!(s.gc.run_l1_gc(), Err(GcError::Interrupted));
        assert_eq!(s.data.value_count(), 3);
        assert_eq!(s.log.history_len(), 3);
    }

    #[test]
    fn test_commit_threshold_triggers_version_gc() {
        let config = GmuConfig {
            version_gc: crate::config::VersionGcConfig {
                enabled: true,
                commit_threshold: 2,
                max_idle_ms: 60_000,
            },
            ..GmuConfig::default()
        };
        let s = single(config);
        Arc::clone(&s.gc).start().unwrap();
        for seq in 1..=4 {
            commit(&s, seq);
        }

        s.gc.notify_committed(2);
        assert_eq!(s.gc.committed_since_last_cycle(), 2);
        s.gc.notify_committed(2);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while s.data.value_count() > 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(s.data.value_count(), 1);
        s.gc.shutdown();
        assert!(s.gc.running_workers().is_empty());
    }

    #[test]
    fn test_single_node_view_gc() {
        let s = single(GmuConfig::default());
        s.views.install(ClusterView::new(7, vec![s.address]));
        commit(&s, 1);

        // commit log still references view 1
        match s.gc.run_view_gc().unwrap() {
            GcOutcome::Views { min_view_id, removed } => {
                assert_eq!(min_view_id, 1);
                assert_eq!(removed, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.views.len(), 2);
    }
}
