//! Commit Manager Tests
//!
//! Sequencing and publication through the transaction commit manager:
//! - Read-only commits bypass the queue and advance the watermark
//! - The prepare counter covers every version ever assigned
//! - Applied batches reach the commit log and the data container in order

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use gmu::cluster::{LocalCluster, NodeAddress};
use gmu::commit::{QueueOptions, TransactionCommitManager};
use gmu::commit_log::{CommitLog, InMemoryCommitLog};
use gmu::config::GmuConfig;
use gmu::node::GmuNode;
use gmu::observability::GmuMetrics;
use gmu::transaction::{GlobalTransactionId, LiveTransactions, WriteOp};
use gmu::version::{GmuVersion, VectorVersionGenerator, VersionGenerator};

fn manager() -> (TransactionCommitManager, Arc<InMemoryCommitLog>) {
    let generator: Arc<dyn VersionGenerator> = Arc::new(VectorVersionGenerator::new(0, 1, 1));
    let log = Arc::new(InMemoryCommitLog::new(Arc::clone(&generator)));
    let manager = TransactionCommitManager::new(
        generator,
        Arc::clone(&log) as Arc<dyn CommitLog>,
        Arc::new(LiveTransactions::new()),
        Arc::new(GmuMetrics::new()),
        QueueOptions::default(),
    );
    (manager, log)
}

fn single_node() -> Arc<GmuNode> {
    let cluster = LocalCluster::new();
    let node = GmuNode::join(&cluster, GmuConfig::default());
    cluster.install_view();
    node
}

// =============================================================================
// Read-Only Tests
// =============================================================================

/// A commit for an id that was never queued returns nothing and moves
/// the watermark to the given version.
#[test]
fn test_read_only_commit_short_circuits() {
    let (manager, log) = manager();
    let never_prepared = GlobalTransactionId::new(NodeAddress::random(), 99);
    let version = GmuVersion::new(1, 0, vec![42]);

    assert!(manager.commit_transaction(&never_prepared, version).is_none());
    assert!(log.get_current_version().component(0) >= 42);
    assert_eq!(manager.queue().size(), 0);
    assert!(manager.last_prepared_version() >= 42);
}

/// Read-only transactions never enter the queue and never block writers.
#[test]
fn test_read_only_does_not_block_writers() {
    let node = single_node();
    let reader = node.begin();
    let writer = node.begin();
    writer.add_write(WriteOp::put("a", b"1".to_vec()));

    node.prepare(&reader);
    node.prepare(&writer);
    assert_eq!(node.manager().queue().size(), 1);

    node.manager()
        .commit_transaction(&writer.gtx(), writer.transaction_version());
    assert_eq!(node.apply_ready().len(), 1);

    assert!(node
        .manager()
        .commit_transaction(&reader.gtx(), reader.transaction_version())
        .is_none());
    node.finish(&reader);
    node.finish(&writer);
    assert_eq!(node.metrics().snapshot().read_only_commits, 1);
}

// =============================================================================
// Sequencing Tests
// =============================================================================

/// After concurrent prepares and commits, the counter is at least every
/// local component ever assigned.
#[test]
fn test_last_prepared_covers_every_assigned_version() {
    let node = single_node();
    let assigned = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let node = Arc::clone(&node);
            let assigned = Arc::clone(&assigned);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                for _ in 0..100 {
                    let tx = node.begin();
                    tx.add_write(WriteOp::put(format!("k{}", t), b"v".to_vec()));
                    node.prepare(&tx);

                    let tentative = tx.transaction_version();
                    let bumped = tentative.this_node_value() + rng.gen_range(0..3);
                    let version = node.generator().set_node_version(&tentative, bumped);
                    assigned.lock().push(tentative.this_node_value());
                    assigned.lock().push(bumped);

                    node.manager().commit_transaction(&tx.gtx(), version);
                    node.finish(&tx);
                    node.apply_ready();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    while !node.apply_ready().is_empty() {}

    let max_assigned = assigned.lock().iter().copied().max().unwrap();
    assert!(node.manager().last_prepared_version() >= max_assigned);
    assert_eq!(node.manager().queue().size(), 0);
}

/// Tentative versions of successive prepares strictly increase.
#[test]
fn test_prepares_are_strictly_increasing() {
    let node = single_node();
    let mut last = 0;
    for i in 0..50 {
        let tx = node.begin();
        tx.add_write(WriteOp::put(format!("k{}", i), b"v".to_vec()));
        node.prepare(&tx);
        let seq = tx.transaction_version().this_node_value();
        assert!(seq > last);
        last = seq;
    }
}

// =============================================================================
// Publication Tests
// =============================================================================

/// Applied transactions are visible to a later reader and recorded in
/// the commit log in application order.
#[test]
fn test_applied_batches_are_published_in_order() {
    let node = single_node();
    let mut rng = StdRng::seed_from_u64(5);

    let mut txs: Vec<_> = (0..30)
        .map(|i| {
            let tx = node.begin();
            tx.add_write(WriteOp::put("shared", (i as u64).to_le_bytes().to_vec()));
            node.prepare(&tx);
            tx
        })
        .collect();
    txs.shuffle(&mut rng);
    for tx in &txs {
        node.manager()
            .commit_transaction(&tx.gtx(), tx.transaction_version());
        node.finish(tx);
    }
    while !node.apply_ready().is_empty() {}

    let history = node.commit_log().history_sequence();
    assert_eq!(history.len(), 30);
    assert!(history.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(node.applied_sequence(), history);

    // The last prepared write wins
    let reader = node.begin();
    assert_eq!(
        node.read(&reader, "shared"),
        Some(29u64.to_le_bytes().to_vec())
    );
    node.finish(&reader);
}

/// A committed entry wakes threads waiting for it.
#[test]
fn test_commit_wakes_committed_waiters() {
    let node = single_node();
    let tx = node.begin();
    tx.add_write(WriteOp::put("a", b"1".to_vec()));
    node.prepare(&tx);
    let entry = node.manager().get_transaction_entry(&tx.gtx()).unwrap();

    let waiter = {
        let entry = Arc::clone(&entry);
        thread::spawn(move || entry.await_until_committed())
    };

    node.manager()
        .commit_transaction(&tx.gtx(), tx.transaction_version());
    node.apply_ready();
    waiter.join().unwrap();

    assert!(entry.is_committed());
    assert!(node.manager().get_transaction_entry(&tx.gtx()).is_none());
}
