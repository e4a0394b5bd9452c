//! GlobalTransactionId - cluster-unique transaction identity

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::cluster::NodeAddress;

/// Globally unique, never reused transaction identity.
///
/// Unique because `sequence` is drawn from a per-origin counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalTransactionId {
    origin: NodeAddress,
    sequence: u64,
}

impl GlobalTransactionId {
    pub fn new(origin: NodeAddress, sequence: u64) -> Self {
        Self { origin, sequence }
    }

    pub fn origin(&self) -> NodeAddress {
        self.origin
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for GlobalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gtx:{}:{}", self.origin, self.sequence)
    }
}

/// Hands out transaction ids for one origin node.
#[derive(Debug)]
pub struct TransactionIdFactory {
    origin: NodeAddress,
    next: AtomicU64,
}

impl TransactionIdFactory {
    pub fn new(origin: NodeAddress) -> Self {
        Self {
            origin,
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> GlobalTransactionId {
        GlobalTransactionId::new(self.origin, self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_factory_never_reuses_ids() {
        let factory = TransactionIdFactory::new(NodeAddress::random());
        let ids: HashSet<_> = (0..100).map(|_| factory.next_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_display() {
        let origin = NodeAddress::new(uuid::Uuid::from_u128(0xabcdef12_0000_0000_0000_000000000000));
        let gtx = GlobalTransactionId::new(origin, 7);
        assert_eq!(gtx.to_string(), "gtx:abcdef12:7");
    }
}
