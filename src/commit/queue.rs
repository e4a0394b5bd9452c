//! SortedTransactionQueue - commit-version ordered queue of in-flight
//! transactions
//!
//! Invariants:
//! - Entries between the sentinels are in non-decreasing
//!   (local component, admission) order
//! - Only entries contiguous from the head are ever ready to commit
//! - Entries with an equal local component form one batch that becomes
//!   ready as a whole
//!
//! The list is an arena of nodes addressed by index. Slot 0 is the head
//! sentinel, slot 1 the tail sentinel. Structural changes and the ready
//! evaluation run under one queue-wide lock; the identity index is a
//! concurrent map that readers use without that lock.

use std::fmt::Write as _;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::entry::TransactionEntry;
use crate::observability::{trace_event, Event, GmuMetrics, Logger};
use crate::transaction::{GlobalTransactionId, GmuTransaction};
use crate::version::{GmuVersion, VersionGenerator};

const HEAD: usize = 0;
const TAIL: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentinel {
    Head,
    Tail,
}

#[derive(Debug)]
enum NodeKind {
    Sentinel(Sentinel),
    Real(Arc<TransactionEntry>),
    Vacant,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    prev: usize,
    next: usize,
}

/// Comparable position of a node. Sentinels bound every real key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NodeKey {
    Lowest,
    Key(u64, u64),
    Highest,
}

#[derive(Debug)]
struct QueueList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    len: usize,
    next_admission: u64,
}

impl QueueList {
    fn new() -> Self {
        let nodes = vec![
            Node {
                kind: NodeKind::Sentinel(Sentinel::Head),
                prev: HEAD,
                next: TAIL,
            },
            Node {
                kind: NodeKind::Sentinel(Sentinel::Tail),
                prev: HEAD,
                next: TAIL,
            },
        ];
        Self {
            nodes,
            free: Vec::new(),
            len: 0,
            next_admission: 0,
        }
    }

    fn next_admission(&mut self) -> u64 {
        let admission = self.next_admission;
        self.next_admission += 1;
        admission
    }

    fn alloc(&mut self, entry: Arc<TransactionEntry>) -> usize {
        let node = Node {
            kind: NodeKind::Real(entry),
            prev: HEAD,
            next: HEAD,
        };
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].kind = NodeKind::Vacant;
        self.free.push(index);
    }

    fn next(&self, index: usize) -> usize {
        self.nodes[index].next
    }

    fn prev(&self, index: usize) -> usize {
        self.nodes[index].prev
    }

    fn entry(&self, index: usize) -> Option<&Arc<TransactionEntry>> {
        match &self.nodes[index].kind {
            NodeKind::Real(entry) => Some(entry),
            NodeKind::Sentinel(_) | NodeKind::Vacant => None,
        }
    }

    fn key(&self, index: usize) -> NodeKey {
        match &self.nodes[index].kind {
            NodeKind::Sentinel(Sentinel::Head) => NodeKey::Lowest,
            NodeKind::Sentinel(Sentinel::Tail) => NodeKey::Highest,
            NodeKind::Real(entry) => {
                let (value, admission) = entry.position_key();
                NodeKey::Key(value, admission)
            }
            NodeKind::Vacant => {
                debug_assert!(false, "vacant slot {} reached through a link", index);
                NodeKey::Highest
            }
        }
    }

    fn link_before(&mut self, index: usize, at: usize) {
        let prev = self.nodes[at].prev;
        self.nodes[index].prev = prev;
        self.nodes[index].next = at;
        self.nodes[prev].next = index;
        self.nodes[at].prev = index;
        self.len += 1;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[index].prev = index;
        self.nodes[index].next = index;
        self.len -= 1;
    }

    /// Link `index` scanning backward from the tail while the
    /// predecessor compares greater.
    fn insert_from_tail(&mut self, index: usize) {
        let key = self.key(index);
        let mut at = TAIL;
        while self.key(self.prev(at)) > key {
            at = self.prev(at);
        }
        self.link_before(index, at);
    }

    /// Restore order around `index` after its key changed. Returns
    /// whether the node moved.
    fn reposition(&mut self, index: usize) -> bool {
        let key = self.key(index);
        let (prev, next) = (self.prev(index), self.next(index));

        if self.key(next) < key {
            self.unlink(index);
            let mut at = next;
            while self.key(at) < key {
                at = self.next(at);
            }
            self.link_before(index, at);
            true
        } else if self.key(prev) > key {
            self.unlink(index);
            let mut after = prev;
            while self.key(after) > key {
                after = self.prev(after);
            }
            let at = self.next(after);
            self.link_before(index, at);
            true
        } else {
            false
        }
    }

    fn is_sorted(&self) -> bool {
        let mut index = self.next(HEAD);
        let mut last = NodeKey::Lowest;
        while index != TAIL {
            let key = self.key(index);
            if key < last {
                return false;
            }
            last = key;
            index = self.next(index);
        }
        true
    }

    fn entries(&self) -> Vec<Arc<TransactionEntry>> {
        let mut out = Vec::with_capacity(self.len);
        let mut index = self.next(HEAD);
        while let Some(entry) = self.entry(index) {
            out.push(Arc::clone(entry));
            index = self.next(index);
        }
        out
    }

    /// Mark ready every complete batch contiguous from the head.
    ///
    /// A batch is the run of entries with an equal local component. It is
    /// complete when every member received its commit command. The walk
    /// skips the ready prefix and stops at the first incomplete batch.
    fn evaluate_ready(&self) {
        let mut cursor = self.next(HEAD);
        // Value and length of the ready run just before `cursor`
        let mut run: Option<(u64, u32)> = None;
        while let Some(entry) = self.entry(cursor) {
            if !entry.is_ready_to_commit() {
                break;
            }
            let value = entry.order_value();
            run = match run {
                Some((v, n)) if v == value => Some((v, n + 1)),
                _ => Some((value, 1)),
            };
            cursor = self.next(cursor);
        }

        while let Some(first) = self.entry(cursor) {
            let value = first.order_value();
            // A late member of an already ready batch continues its numbering
            let offset = match run.take() {
                Some((v, n)) if v == value => n,
                _ => 0,
            };
            let mut batch = Vec::new();
            let mut complete = true;
            let mut probe = cursor;
            while let Some(entry) = self.entry(probe) {
                if entry.order_value() != value {
                    break;
                }
                complete &= entry.is_received_commit_command();
                batch.push(probe);
                probe = self.next(probe);
            }

            if !complete {
                return;
            }

            for (position, index) in batch.into_iter().enumerate() {
                if let Some(entry) = self.entry(index) {
                    entry.mark_ready_to_commit(offset + position as u32);
                }
            }
            cursor = probe;
        }
    }
}

#[derive(Debug, Clone)]
struct QueueSlot {
    index: usize,
    entry: Arc<TransactionEntry>,
}

/// Options fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOptions {
    /// Record blocking waits on the ready latch in the metrics
    pub track_waiting: bool,
}

/// Commit-ordered queue of locally prepared transactions.
pub struct SortedTransactionQueue {
    list: Mutex<QueueList>,
    index: DashMap<GlobalTransactionId, QueueSlot>,
    generator: Arc<dyn VersionGenerator>,
    metrics: Arc<GmuMetrics>,
    options: QueueOptions,
}

impl SortedTransactionQueue {
    pub fn new(
        generator: Arc<dyn VersionGenerator>,
        metrics: Arc<GmuMetrics>,
        options: QueueOptions,
    ) -> Self {
        Self {
            list: Mutex::new(QueueList::new()),
            index: DashMap::new(),
            generator,
            metrics,
            options,
        }
    }

    /// Queue `transaction` at its current (tentative) version.
    ///
    /// A second prepare for a queued id replaces the previous entry; the
    /// old node is unlinked under the same lock and its waiters released.
    pub fn prepare(&self, transaction: Arc<GmuTransaction>, concurrent_clock_number: u64) {
        let gtx = transaction.gtx();
        let order_value = self
            .generator
            .this_node_value(&transaction.transaction_version());
        let wait_metrics = self
            .options
            .track_waiting
            .then(|| Arc::clone(&self.metrics));

        let mut list = self.list.lock();

        let replaced = self.index.remove(&gtx).map(|(_, stale)| {
            list.unlink(stale.index);
            list.release(stale.index);
            stale.entry.release_waiters();
            stale
        });
        if let Some(stale) = &replaced {
            self.metrics.increment_duplicate_prepares();
            Logger::warn(
                Event::PrepareDuplicate.as_str(),
                &[
                    ("gtx", &gtx.to_string()),
                    ("stale_version", &stale.entry.version().to_string()),
                ],
            );
        }

        let admission = list.next_admission();
        let entry = Arc::new(TransactionEntry::new(
            transaction,
            order_value,
            admission,
            concurrent_clock_number,
            wait_metrics,
        ));
        let index = list.alloc(Arc::clone(&entry));
        list.insert_from_tail(index);
        self.index.insert(gtx, QueueSlot { index, entry });
        debug_assert!(list.is_sorted(), "queue out of order after prepare");

        if replaced.is_some() {
            list.evaluate_ready();
        }
    }

    /// Record the final commit version of `gtx`. `None` when the id is not
    /// queued, e.g. a read-only transaction.
    pub fn commit(
        &self,
        gtx: &GlobalTransactionId,
        version: GmuVersion,
    ) -> Option<Arc<TransactionEntry>> {
        let mut list = self.list.lock();
        let slot = self.index.get(gtx).map(|s| s.value().clone())?;

        let order_value = self.generator.this_node_value(&version);
        slot.entry.set_commit_version(version, order_value);
        if list.reposition(slot.index) {
            trace_event(
                Event::EntryRepositioned,
                &[("gtx", &gtx.to_string()), ("seq", &order_value.to_string())],
            );
        }
        debug_assert!(list.is_sorted(), "queue out of order after commit");

        list.evaluate_ready();
        // Held by an undecided entry ahead or in the same batch
        if !slot.entry.is_ready_to_commit() {
            slot.entry.set_pending_due_to_other_tx(true);
        }
        Some(slot.entry)
    }

    /// Remove `gtx` if queued. Entries blocked only by it may become ready.
    pub fn rollback(&self, gtx: &GlobalTransactionId) -> Option<Arc<TransactionEntry>> {
        let mut list = self.list.lock();
        let (_, slot) = self.index.remove(gtx)?;
        list.unlink(slot.index);
        list.release(slot.index);
        slot.entry.release_waiters();

        list.evaluate_ready();
        Some(slot.entry)
    }

    /// Append the ready prefix, in queue order, to `out`.
    pub fn populate_to_commit(&self, out: &mut Vec<Arc<TransactionEntry>>) {
        let list = self.list.lock();
        let mut index = list.next(HEAD);
        while let Some(entry) = list.entry(index) {
            if !entry.is_ready_to_commit() {
                break;
            }
            out.push(Arc::clone(entry));
            index = list.next(index);
        }
    }

    /// Detach the committed prefix and re-evaluate from the new head.
    /// Returns the number of entries removed.
    pub fn notify_transactions_committed(&self) -> usize {
        let mut list = self.list.lock();
        let mut removed = 0;
        loop {
            let head = list.next(HEAD);
            let gtx = match list.entry(head) {
                Some(entry) if entry.is_committed() => entry.gtx(),
                _ => break,
            };
            list.unlink(head);
            list.release(head);
            // The index may already point at a newer prepare of the same id
            self.index.remove_if(&gtx, |_, slot| slot.index == head);
            removed += 1;
        }

        list.evaluate_ready();
        removed
    }

    pub fn get_transaction_entry(&self, gtx: &GlobalTransactionId) -> Option<Arc<TransactionEntry>> {
        self.index.get(gtx).map(|slot| Arc::clone(&slot.entry))
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Entries in queue order.
    pub fn entries(&self) -> Vec<Arc<TransactionEntry>> {
        self.list.lock().entries()
    }

    pub fn is_sorted(&self) -> bool {
        self.list.lock().is_sorted()
    }

    /// One line per entry, head first.
    pub fn print_queue(&self) -> String {
        let entries = self.entries();
        let mut out = format!("queue size={}\n", entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {}", position, entry);
        }
        out
    }
}
