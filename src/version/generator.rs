//! Version algebra: merge, min/max, local component re-stamping

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::vector::{GmuVersion, NodeIndex, ViewId};

/// Version algebra used by the commit manager, the commit log and the GC.
pub trait VersionGenerator: Send + Sync {
    /// Position of the local node in the current view.
    fn local_index(&self) -> NodeIndex;

    /// Id of the current view.
    fn current_view_id(&self) -> ViewId;

    /// The ordering accessor: the local node's component of `version`.
    fn this_node_value(&self, version: &GmuVersion) -> u64 {
        version.component(self.local_index())
    }

    /// Component-wise minimum of `versions`. `None` for an empty input.
    fn merge_and_min(&self, versions: &[GmuVersion]) -> Option<GmuVersion>;

    /// Component-wise maximum of `versions`. `None` for an empty input.
    fn merge_and_max(&self, versions: &[GmuVersion]) -> Option<GmuVersion>;

    /// Copy of `base` with the local component replaced by `seq`.
    fn set_node_version(&self, base: &GmuVersion, seq: u64) -> GmuVersion;

    /// Version with every component at zero in the current view.
    fn zero(&self) -> GmuVersion;
}

/// Vector-clock generator for one node.
///
/// View id and local index change only when a new view is installed.
#[derive(Debug)]
pub struct VectorVersionGenerator {
    local_index: AtomicUsize,
    view_id: AtomicU64,
    members: AtomicUsize,
}

impl VectorVersionGenerator {
    pub fn new(local_index: NodeIndex, view_id: ViewId, members: usize) -> Self {
        Self {
            local_index: AtomicUsize::new(local_index),
            view_id: AtomicU64::new(view_id),
            members: AtomicUsize::new(members.max(local_index + 1)),
        }
    }

    /// Adopt the positions of a newly installed view.
    pub fn on_view_installed(&self, view_id: ViewId, local_index: NodeIndex, members: usize) {
        self.local_index.store(local_index, Ordering::SeqCst);
        self.members
            .store(members.max(local_index + 1), Ordering::SeqCst);
        self.view_id.store(view_id, Ordering::SeqCst);
    }

    fn merge_with(
        &self,
        versions: &[GmuVersion],
        pick: fn(u64, u64) -> u64,
        pick_view: fn(ViewId, ViewId) -> ViewId,
    ) -> Option<GmuVersion> {
        let (first, rest) = versions.split_first()?;
        let len = versions.iter().map(|v| v.clock().len()).max().unwrap_or(0);

        let mut clock: Vec<u64> = (0..len).map(|i| first.component(i)).collect();
        let mut view_id = first.view_id();
        for version in rest {
            for (i, slot) in clock.iter_mut().enumerate() {
                *slot = pick(*slot, version.component(i));
            }
            view_id = pick_view(view_id, version.view_id());
        }

        Some(GmuVersion::new(view_id, self.local_index(), clock))
    }
}

impl VersionGenerator for VectorVersionGenerator {
    fn local_index(&self) -> NodeIndex {
        self.local_index.load(Ordering::SeqCst)
    }

    fn current_view_id(&self) -> ViewId {
        self.view_id.load(Ordering::SeqCst)
    }

    fn merge_and_min(&self, versions: &[GmuVersion]) -> Option<GmuVersion> {
        // A position absent from one input reads as 0 there, so the
        // minimum can only get more conservative.
        self.merge_with(versions, u64::min, ViewId::min)
    }

    fn merge_and_max(&self, versions: &[GmuVersion]) -> Option<GmuVersion> {
        self.merge_with(versions, u64::max, ViewId::max)
    }

    fn set_node_version(&self, base: &GmuVersion, seq: u64) -> GmuVersion {
        let local = self.local_index();
        base.rehomed(local).with_component(local, seq)
    }

    fn zero(&self) -> GmuVersion {
        GmuVersion::zero(
            self.current_view_id(),
            self.local_index(),
            self.members.load(Ordering::SeqCst),
        )
    }
}
