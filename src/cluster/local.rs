//! In-process cluster used to wire several nodes together in one process
//!
//! Member faults can be injected to exercise the GC gather policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;

use super::transport::{
    ClusterTransport, GcRequest, GcRequestHandler, MemberReply, ViewListener,
};
use super::view::{ClusterView, NodeAddress};
use crate::observability::{log_event_with_fields, Event};

/// Injected behavior of one member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberFault {
    /// Still in the view, but answers as if it had left
    Departed,
    /// Never answers
    Unresponsive,
    /// Answers with an error
    Failing(String),
}

struct Member {
    address: NodeAddress,
    handler: Weak<dyn GcRequestHandler>,
    listener: Weak<dyn ViewListener>,
}

/// Shared state of an in-process cluster.
pub struct LocalCluster {
    members: RwLock<Vec<Member>>,
    faults: RwLock<HashMap<NodeAddress, MemberFault>>,
    view: RwLock<ClusterView>,
    next_view_id: AtomicU64,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            members: RwLock::new(Vec::new()),
            faults: RwLock::new(HashMap::new()),
            view: RwLock::new(ClusterView::new(0, Vec::new())),
            next_view_id: AtomicU64::new(1),
        })
    }

    /// Register a node without installing a new view.
    pub fn register(
        &self,
        address: NodeAddress,
        handler: Weak<dyn GcRequestHandler>,
        listener: Weak<dyn ViewListener>,
    ) {
        let mut members = self.members.write();
        members.retain(|m| m.address != address);
        members.push(Member {
            address,
            handler,
            listener,
        });
    }

    /// Install a view made of every registered node, in registration
    /// order, and notify each of them.
    pub fn install_view(&self) -> ClusterView {
        let view_id = self.next_view_id.fetch_add(1, Ordering::SeqCst);
        let addresses: Vec<NodeAddress> =
            self.members.read().iter().map(|m| m.address).collect();
        let view = ClusterView::new(view_id, addresses);
        *self.view.write() = view.clone();

        log_event_with_fields(
            Event::ViewInstalled,
            &[
                ("members", &view.members().len().to_string()),
                ("view_id", &view_id.to_string()),
            ],
        );

        let listeners: Vec<Arc<dyn ViewListener>> = self
            .members
            .read()
            .iter()
            .filter_map(|m| m.listener.upgrade())
            .collect();
        for listener in listeners {
            listener.view_installed(&view);
        }
        view
    }

    /// Remove a node and install the resulting view.
    pub fn leave(&self, address: &NodeAddress) -> ClusterView {
        self.members.write().retain(|m| &m.address != address);
        self.faults.write().remove(address);
        self.install_view()
    }

    pub fn set_fault(&self, address: NodeAddress, fault: MemberFault) {
        self.faults.write().insert(address, fault);
    }

    pub fn clear_fault(&self, address: &NodeAddress) {
        self.faults.write().remove(address);
    }

    pub fn current_view(&self) -> ClusterView {
        self.view.read().clone()
    }

    /// Transport endpoint for `address`.
    pub fn transport(self: &Arc<Self>, address: NodeAddress) -> LocalTransport {
        LocalTransport {
            cluster: Arc::clone(self),
            local: address,
        }
    }

    fn deliver(&self, target: &NodeAddress, request: &GcRequest) -> MemberReply {
        if let Some(fault) = self.faults.read().get(target).cloned() {
            return match fault {
                MemberFault::Departed => MemberReply::Departed,
                MemberFault::Unresponsive => MemberReply::TimedOut,
                MemberFault::Failing(reason) => MemberReply::Failed(reason),
            };
        }

        let handler = self
            .members
            .read()
            .iter()
            .find(|m| &m.address == target)
            .and_then(|m| m.handler.upgrade());

        match handler {
            Some(handler) => MemberReply::Response(handler.handle_gc_request(request)),
            // Dropped node: same as having left
            None => MemberReply::Departed,
        }
    }
}

/// One node's endpoint on a [`LocalCluster`].
#[derive(Clone)]
pub struct LocalTransport {
    cluster: Arc<LocalCluster>,
    local: NodeAddress,
}

impl ClusterTransport for LocalTransport {
    fn local_address(&self) -> NodeAddress {
        self.local
    }

    fn members(&self) -> Vec<NodeAddress> {
        self.cluster.current_view().members().to_vec()
    }

    // Delivery is a direct call, so the timeout only matters for members
    // flagged unresponsive.
    fn broadcast(&self, request: &GcRequest, _timeout: Duration) -> Vec<(NodeAddress, MemberReply)> {
        self.members()
            .into_iter()
            .filter(|m| m != &self.local)
            .map(|m| {
                let reply = self.cluster.deliver(&m, request);
                (m, reply)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::GcResponse;
    use parking_lot::Mutex;

    struct FixedHandler(u64);

    impl GcRequestHandler for FixedHandler {
        fn handle_gc_request(&self, _request: &GcRequest) -> GcResponse {
            GcResponse::MinimumViewId(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingListener(Mutex<Vec<u64>>);

    impl ViewListener for RecordingListener {
        fn view_installed(&self, view: &ClusterView) {
            self.0.lock().push(view.view_id());
        }
    }

    fn join(
        cluster: &Arc<LocalCluster>,
        value: u64,
    ) -> (NodeAddress, Arc<FixedHandler>, Arc<RecordingListener>) {
        let address = NodeAddress::random();
        let handler = Arc::new(FixedHandler(value));
        let listener = Arc::new(RecordingListener::default());
        let h: Arc<dyn GcRequestHandler> = handler.clone();
        let l: Arc<dyn ViewListener> = listener.clone();
        cluster.register(address, Arc::downgrade(&h), Arc::downgrade(&l));
        (address, handler, listener)
    }

    #[test]
    fn test_broadcast_excludes_self() {
        let cluster = LocalCluster::new();
        let (a, _ha, _la) = join(&cluster, 1);
        let (b, _hb, _lb) = join(&cluster, 2);
        cluster.install_view();

        let replies = cluster
            .transport(a)
            .broadcast(&GcRequest::MinimumViewId, Duration::from_secs(1));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, b);
        assert_eq!(
            replies[0].1,
            MemberReply::Response(GcResponse::MinimumViewId(2))
        );
    }

    #[test]
    fn test_faults_are_reported_per_member() {
        let cluster = LocalCluster::new();
        let (a, _ha, _la) = join(&cluster, 1);
        let (b, _hb, _lb) = join(&cluster, 2);
        let (c, _hc, _lc) = join(&cluster, 3);
        cluster.install_view();
        cluster.set_fault(b, MemberFault::Unresponsive);
        cluster.set_fault(c, MemberFault::Departed);

        let replies = cluster
            .transport(a)
            .broadcast(&GcRequest::MinimumViewId, Duration::from_secs(1));
        assert!(replies.contains(&(b, MemberReply::TimedOut)));
        assert!(replies.contains(&(c, MemberReply::Departed)));
    }

    #[test]
    fn test_install_view_notifies_and_orders_coordinator() {
        let cluster = LocalCluster::new();
        let (a, _ha, la) = join(&cluster, 1);
        let (b, _hb, lb) = join(&cluster, 2);

        let first = cluster.install_view();
        assert!(cluster.transport(a).is_coordinator());
        assert!(!cluster.transport(b).is_coordinator());

        let second = cluster.leave(&a);
        assert_eq!(second.view_id(), first.view_id() + 1);
        assert!(cluster.transport(b).is_coordinator());
        assert_eq!(*lb.0.lock(), vec![first.view_id(), second.view_id()]);
        // a left before the second view was installed
        assert_eq!(*la.0.lock(), vec![first.view_id()]);
    }

    #[test]
    fn test_dropped_handler_counts_as_departed() {
        let cluster = LocalCluster::new();
        let (a, _ha, _la) = join(&cluster, 1);
        let (b, hb, _lb) = join(&cluster, 2);
        cluster.install_view();
        drop(hb);

        let replies = cluster
            .transport(a)
            .broadcast(&GcRequest::MinimumViewId, Duration::from_secs(1));
        assert_eq!(replies, vec![(b, MemberReply::Departed)]);
    }
}
