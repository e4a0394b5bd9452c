//! GmuVersion - per-node vector clock
//!
//! - One sequence component per node position of a cluster view
//! - Carries the view id under which the positions are valid
//! - Immutable: re-stamping produces a new value

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a node inside a cluster view.
pub type NodeIndex = usize;

/// Cluster membership epoch.
pub type ViewId = u64;

/// A point in the multiversion timeline.
///
/// `node_index` names the component this version was produced for; the
/// commit queue orders by that component only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmuVersion {
    view_id: ViewId,
    node_index: NodeIndex,
    clock: Vec<u64>,
}

impl GmuVersion {
    /// Creates a version from its parts.
    pub fn new(view_id: ViewId, node_index: NodeIndex, clock: Vec<u64>) -> Self {
        Self {
            view_id,
            node_index,
            clock,
        }
    }

    /// The all-zero version for a view of `members` nodes.
    pub fn zero(view_id: ViewId, node_index: NodeIndex, members: usize) -> Self {
        Self::new(view_id, node_index, vec![0; members.max(node_index + 1)])
    }

    #[inline]
    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    #[inline]
    pub fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    pub fn clock(&self) -> &[u64] {
        &self.clock
    }

    /// Component at `index`; absent components read as 0.
    #[inline]
    pub fn component(&self, index: NodeIndex) -> u64 {
        self.clock.get(index).copied().unwrap_or(0)
    }

    /// Component of the node this version was produced for.
    #[inline]
    pub fn this_node_value(&self) -> u64 {
        self.component(self.node_index)
    }

    /// Copy with `index` set to `value`, growing the vector if needed.
    pub fn with_component(&self, index: NodeIndex, value: u64) -> Self {
        let mut clock = self.clock.clone();
        if clock.len() <= index {
            clock.resize(index + 1, 0);
        }
        clock[index] = value;
        Self {
            view_id: self.view_id,
            node_index: self.node_index,
            clock,
        }
    }

    /// Same clock, read from the perspective of `node_index`.
    pub fn rehomed(&self, node_index: NodeIndex) -> Self {
        Self {
            view_id: self.view_id,
            node_index,
            clock: self.clock.clone(),
        }
    }

    /// Component-wise `<=` over the union of positions.
    pub fn dominated_by(&self, other: &GmuVersion) -> bool {
        let len = self.clock.len().max(other.clock.len());
        (0..len).all(|i| self.component(i) <= other.component(i))
    }
}

impl fmt::Display for GmuVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}{:?}", self.view_id, self.node_index, self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_this_node_value() {
        let v = GmuVersion::new(1, 2, vec![4, 5, 6]);
        assert_eq!(v.this_node_value(), 6);
        assert_eq!(v.component(7), 0);
    }

    #[test]
    fn test_with_component_grows_vector() {
        let v = GmuVersion::new(1, 0, vec![3]);
        let w = v.with_component(2, 9);
        assert_eq!(w.clock(), &[3, 0, 9]);
        // original untouched
        assert_eq!(v.clock(), &[3]);
    }

    #[test]
    fn test_dominated_by() {
        let a = GmuVersion::new(1, 0, vec![1, 2]);
        let b = GmuVersion::new(1, 0, vec![1, 3, 1]);
        assert!(a.dominated_by(&b));
        assert!(!b.dominated_by(&a));
    }

    #[test]
    fn test_display() {
        let v = GmuVersion::new(3, 1, vec![0, 7]);
        assert_eq!(v.to_string(), "v3@1[0, 7]");
    }
}
