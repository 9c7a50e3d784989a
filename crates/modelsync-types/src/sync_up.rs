//! Sync-up broadcast messages
//!
//! Every cycle issues two broadcast rounds over the same request type: a
//! `Gather` round collecting node reports, then an `ApplyRouting` round
//! pushing the cluster-wide routing table and expired-model cleanup back.

use crate::{CycleId, ModelId, NodeId, NodeReport, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Request broadcast to every eligible node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncUpRequest {
    /// Ask the node for its local runtime state
    Gather { cycle_id: CycleId },

    /// Push the aggregated view back to the node
    ApplyRouting {
        cycle_id: CycleId,
        /// model -> nodes currently serving it
        routing_table: BTreeMap<ModelId, BTreeSet<NodeId>>,
        /// deploy task -> nodes running it
        running_deploy_tasks: BTreeMap<TaskId, BTreeSet<NodeId>>,
        /// Models expired on every hosting node, to be undeployed
        expired_model_ids: BTreeSet<ModelId>,
    },
}

impl SyncUpRequest {
    pub fn cycle_id(&self) -> CycleId {
        match self {
            SyncUpRequest::Gather { cycle_id } => *cycle_id,
            SyncUpRequest::ApplyRouting { cycle_id, .. } => *cycle_id,
        }
    }
}

/// A node's answer to a [`SyncUpRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncUpResponse {
    Report(NodeReport),
    Applied {
        node_id: NodeId,
        undeployed_model_ids: BTreeSet<ModelId>,
    },
}

impl SyncUpResponse {
    pub fn node_id(&self) -> &NodeId {
        match self {
            SyncUpResponse::Report(report) => &report.node_id,
            SyncUpResponse::Applied { node_id, .. } => node_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let cycle_id = CycleId::generate();
        let value = serde_json::to_value(SyncUpRequest::Gather { cycle_id }).unwrap();
        assert_eq!(value["kind"], "gather");
        assert_eq!(SyncUpRequest::Gather { cycle_id }.cycle_id(), cycle_id);
    }

    #[test]
    fn test_response_node_id() {
        let response = SyncUpResponse::Report(NodeReport::new(NodeId::new("n1")));
        assert_eq!(response.node_id().as_str(), "n1");
    }
}
