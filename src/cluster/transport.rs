//! Request/response broadcast used by the garbage collectors

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::view::{ClusterView, NodeAddress};
use crate::version::{GmuVersion, ViewId};

/// Requests exchanged between GC managers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcRequest {
    /// Minimum version pinned by the receiver's live local transactions
    MinimumVisibleVersion,
    /// Minimum view id still referenced by the receiver's commit log
    MinimumViewId,
    /// Purge view metadata below the given id
    PurgeViews { min_view_id: ViewId },
}

/// Answers to [`GcRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcResponse {
    MinimumVisibleVersion(GmuVersion),
    MinimumViewId(ViewId),
    Ack,
}

/// What came back from one member of a broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberReply {
    Response(GcResponse),
    /// Member left the cluster before answering
    Departed,
    /// Member is still in the view but did not answer in time
    TimedOut,
    /// Member answered with an error
    Failed(String),
}

/// Server side of the GC protocol.
pub trait GcRequestHandler: Send + Sync {
    fn handle_gc_request(&self, request: &GcRequest) -> GcResponse;
}

/// Receives membership changes.
pub trait ViewListener: Send + Sync {
    fn view_installed(&self, view: &ClusterView);
}

/// Cluster transport as seen from one node.
pub trait ClusterTransport: Send + Sync {
    fn local_address(&self) -> NodeAddress;

    /// Members of the current view, self included.
    fn members(&self) -> Vec<NodeAddress>;

    fn is_coordinator(&self) -> bool {
        self.members().first() == Some(&self.local_address())
    }

    /// Send `request` to every member except self and collect one reply
    /// per member. Never fails as a whole; per-member problems are
    /// reported in the reply.
    fn broadcast(&self, request: &GcRequest, timeout: Duration) -> Vec<(NodeAddress, MemberReply)>;
}
