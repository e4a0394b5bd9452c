//! In-process workload over several nodes
//!
//! Worker threads prepare small batches of transactions on random nodes
//! and deliver their final versions in shuffled order. A final version
//! merges the state seen on a random peer, the way a remote participant
//! would, and may bump the local component above the tentative one.
//! Some transactions roll back and some are read-only.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::GmuNode;
use crate::cluster::LocalCluster;
use crate::commit_log::CommitLog;
use crate::config::GmuConfig;
use crate::gc::{GcOutcome, GcResult};
use crate::observability::MetricsSnapshot;
use crate::transaction::{GmuTransaction, WriteOp};
use crate::version::{GmuVersion, VersionGenerator};

const BATCH: usize = 4;
const KEYS: usize = 64;

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub nodes: usize,
    pub transactions: usize,
    pub threads: usize,
    pub seed: u64,
    pub config: GmuConfig,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            nodes: 3,
            transactions: 1000,
            threads: 4,
            seed: 42,
            config: GmuConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub address: String,
    pub applied: usize,
    /// Application order was non-decreasing in the local component
    pub ordered: bool,
    pub queue_size: usize,
    pub history_len: usize,
    pub stored_values: usize,
    pub l1_values: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub transactions: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub drain_order_ok: bool,
    pub gc: Vec<GcOutcome>,
    pub nodes: Vec<NodeReport>,
    pub elapsed_ms: u128,
}

impl SimulationReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Default)]
struct ThreadTally {
    committed: usize,
    rolled_back: usize,
}

/// Run the workload, one GC cycle of each kind, and report.
pub fn simulate(options: &SimulationOptions) -> GcResult<SimulationReport> {
    let started = Instant::now();
    let cluster = LocalCluster::new();
    let nodes: Vec<Arc<GmuNode>> = (0..options.nodes.max(1))
        .map(|_| GmuNode::join(&cluster, options.config.clone()))
        .collect();
    cluster.install_view();
    for node in &nodes {
        node.start()?;
    }

    let threads = options.threads.max(1);
    let tallies: Vec<ThreadTally> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let nodes = &nodes;
                let share = options.transactions / threads
                    + usize::from(t < options.transactions % threads);
                let seed = options.seed.wrapping_add(t as u64);
                scope.spawn(move || run_worker(nodes, share, seed))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    });

    for node in &nodes {
        while !node.apply_ready().is_empty() {}
    }
    exchange_versions(&nodes);

    let mut gc = Vec::new();
    for node in &nodes {
        gc.push(node.gc().run_version_gc()?);
        gc.push(node.gc().run_l1_gc()?);
    }
    gc.push(nodes[0].gc().run_view_gc()?);

    for node in &nodes {
        node.shutdown();
    }

    let reports: Vec<NodeReport> = nodes.iter().map(|n| node_report(n)).collect();
    Ok(SimulationReport {
        seed: options.seed,
        transactions: options.transactions,
        committed: tallies.iter().map(|t| t.committed).sum(),
        rolled_back: tallies.iter().map(|t| t.rolled_back).sum(),
        drain_order_ok: reports.iter().all(|r| r.ordered && r.queue_size == 0),
        gc,
        nodes: reports,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

fn run_worker(nodes: &[Arc<GmuNode>], transactions: usize, seed: u64) -> ThreadTally {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tally = ThreadTally::default();
    let mut remaining = transactions;

    while remaining > 0 {
        let node = &nodes[rng.gen_range(0..nodes.len())];
        let peer = &nodes[rng.gen_range(0..nodes.len())];
        let size = remaining.min(BATCH);
        remaining -= size;

        let mut batch: Vec<Arc<GmuTransaction>> = Vec::with_capacity(size);
        for _ in 0..size {
            let tx = node.begin();
            if rng.gen_bool(0.9) {
                let key = format!("k{}", rng.gen_range(0..KEYS));
                tx.add_write(WriteOp::put(key, rng.gen::<u64>().to_le_bytes().to_vec()));
            }
            node.prepare(&tx);
            batch.push(tx);
        }
        batch.shuffle(&mut rng);

        for tx in batch {
            if tx.has_modifications() && rng.gen_bool(0.05) {
                node.manager().rollback_transaction(&tx);
                tally.rolled_back += 1;
            } else {
                let version = if tx.has_modifications() {
                    final_version(node, peer, &tx, &mut rng)
                } else {
                    tx.transaction_version()
                };
                node.manager().commit_transaction(&tx.gtx(), version);
                tally.committed += 1;
            }
            node.finish(&tx);

            let peer_index = rng.gen_range(0..nodes.len());
            for committed in node.apply_ready() {
                nodes[peer_index].cache_in_l1(&committed);
            }
        }
    }
    tally
}

/// Tentative version merged with what `peer` has seen, local component
/// possibly bumped.
fn final_version(
    node: &GmuNode,
    peer: &GmuNode,
    tx: &GmuTransaction,
    rng: &mut StdRng,
) -> GmuVersion {
    let generator = node.generator();
    let tentative = tx.transaction_version();
    let seq = generator.this_node_value(&tentative) + rng.gen_range(0..2);
    let merged = generator
        .merge_and_max(&[tentative.clone(), peer.commit_log().get_current_version()])
        .unwrap_or(tentative);
    generator.set_node_version(&merged, seq)
}

/// Let every node learn the visible versions of every other node.
fn exchange_versions(nodes: &[Arc<GmuNode>]) {
    let versions: Vec<_> = nodes
        .iter()
        .map(|n| n.commit_log().get_current_version())
        .collect();
    for node in nodes {
        for version in &versions {
            node.commit_log().update_most_recent_version(version);
        }
    }
}

fn node_report(node: &GmuNode) -> NodeReport {
    let sequence = node.applied_sequence();
    NodeReport {
        address: node.address().to_string(),
        applied: sequence.len(),
        ordered: sequence.windows(2).all(|w| w[0] <= w[1]),
        queue_size: node.manager().queue().size(),
        history_len: node.commit_log().history_len(),
        stored_values: node.data_container().value_count(),
        l1_values: node.l1_container().value_count(),
        metrics: node.metrics().snapshot(),
    }
}
