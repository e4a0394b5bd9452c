//! Cluster membership and GC transport
//!
//! This module provides:
//! - `NodeAddress`, `ClusterView` - member identity and membership epochs
//! - `ViewRegistry` - view-id → member table, purged by the View GC
//! - `ClusterTransport` - request/response broadcast with per-member replies
//! - `LocalCluster` - in-process transport with fault injection

mod local;
mod transport;
mod view;

pub use local::{LocalCluster, LocalTransport, MemberFault};
pub use transport::{
    ClusterTransport, GcRequest, GcRequestHandler, GcResponse, MemberReply, ViewListener,
};
pub use view::{ClusterView, NodeAddress, ViewRegistry};
