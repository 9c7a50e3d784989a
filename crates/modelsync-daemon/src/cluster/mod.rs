//! Cluster collaborators
//!
//! The sync-up cycle only needs two things from the cluster: the list of
//! eligible nodes, and a way to send each of them a [`SyncUpRequest`].

mod local;

pub use local::{LocalCluster, NodeRuntime};

use crate::error::ClusterResult;
use async_trait::async_trait;
use modelsync_types::{NodeId, SyncUpRequest, SyncUpResponse};

/// Source of eligible nodes for a broadcast
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// Nodes that should take part in the next broadcast round
    async fn list_eligible_nodes(&self) -> ClusterResult<Vec<NodeId>>;
}

/// Point-to-point transport to a single node
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn sync_up(&self, node_id: &NodeId, request: SyncUpRequest)
        -> ClusterResult<SyncUpResponse>;
}
