//! Cluster views and the view-id → membership table

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::{NodeIndex, ViewId};

/// Identity of a cluster member.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress(Uuid);

impl NodeAddress {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// A fresh random address.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell members apart in logs
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

/// A membership epoch. The first member is the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    view_id: ViewId,
    members: Vec<NodeAddress>,
}

impl ClusterView {
    pub fn new(view_id: ViewId, members: Vec<NodeAddress>) -> Self {
        Self { view_id, members }
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn members(&self) -> &[NodeAddress] {
        &self.members
    }

    pub fn coordinator(&self) -> Option<NodeAddress> {
        self.members.first().copied()
    }

    /// Vector position of `address` in this view.
    pub fn index_of(&self, address: &NodeAddress) -> Option<NodeIndex> {
        self.members.iter().position(|m| m == address)
    }

    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.members.contains(address)
    }
}

/// Table of installed views, needed to interpret versions produced under
/// older views. Stale entries are purged by the View GC.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: RwLock<BTreeMap<ViewId, ClusterView>>,
    current: RwLock<Option<ViewId>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `view` and make it current when it is the newest.
    pub fn install(&self, view: ClusterView) {
        let id = view.view_id();
        self.views.write().insert(id, view);
        let mut current = self.current.write();
        if current.map_or(true, |c| id >= c) {
            *current = Some(id);
        }
    }

    pub fn current(&self) -> Option<ClusterView> {
        let id = (*self.current.read())?;
        self.views.read().get(&id).cloned()
    }

    pub fn view(&self, view_id: ViewId) -> Option<ClusterView> {
        self.views.read().get(&view_id).cloned()
    }

    pub fn members_of(&self, view_id: ViewId) -> Option<Vec<NodeAddress>> {
        self.views.read().get(&view_id).map(|v| v.members().to_vec())
    }

    pub fn len(&self) -> usize {
        self.views.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.read().is_empty()
    }

    /// Oldest view still held.
    pub fn oldest_view_id(&self) -> Option<ViewId> {
        self.views.read().keys().next().copied()
    }

    /// Drop every view with id below `min_view_id`, never the current one.
    /// Returns the number of views removed.
    pub fn gc_unreachable_cache_topology(&self, min_view_id: ViewId) -> usize {
        let current = *self.current.read();
        let mut views = self.views.write();
        let before = views.len();
        views.retain(|id, _| *id >= min_view_id || Some(*id) == current);
        before - views.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(n: u128) -> Vec<NodeAddress> {
        (1..=n).map(|i| NodeAddress::new(Uuid::from_u128(i))).collect()
    }

    #[test]
    fn test_coordinator_is_first_member() {
        let members = addresses(3);
        let view = ClusterView::new(1, members.clone());
        assert_eq!(view.coordinator(), Some(members[0]));
        assert_eq!(view.index_of(&members[2]), Some(2));
    }

    #[test]
    fn test_install_tracks_newest_view() {
        let registry = ViewRegistry::new();
        registry.install(ClusterView::new(2, addresses(2)));
        registry.install(ClusterView::new(1, addresses(1)));

        assert_eq!(registry.current().unwrap().view_id(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_gc_keeps_current_view() {
        let registry = ViewRegistry::new();
        for id in 1..=4 {
            registry.install(ClusterView::new(id, addresses(2)));
        }

        assert_eq!(registry.gc_unreachable_cache_topology(3), 2);
        assert_eq!(registry.oldest_view_id(), Some(3));

        // Even a floor above the current view keeps the current view
        assert_eq!(registry.gc_unreachable_cache_topology(10), 1);
        assert_eq!(registry.current().unwrap().view_id(), 4);
        assert_eq!(registry.len(), 1);
    }
}
