//! Broadcast rounds over the eligible nodes

use super::events::EventPublisher;
use crate::cluster::{ClusterMembership, NodeRpc};
use crate::error::{ClusterError, ClusterResult, SyncResult};
use futures::future::join_all;
use modelsync_types::{
    AggregatedState, CycleId, ModelId, NodeId, SyncEvent, SyncUpRequest, SyncUpResponse,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Result of the routing push round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingSyncOutcome {
    pub acknowledged: BTreeSet<NodeId>,
    pub failed: BTreeSet<NodeId>,
    /// Models each node reported undeploying
    pub undeployed: BTreeMap<NodeId, BTreeSet<ModelId>>,
}

/// Fans sync-up requests out to every eligible node and folds the answers
pub struct NodeStateGatherer {
    membership: Arc<dyn ClusterMembership>,
    rpc: Arc<dyn NodeRpc>,
    timeout: Duration,
    events: EventPublisher,
}

impl NodeStateGatherer {
    pub fn new(
        membership: Arc<dyn ClusterMembership>,
        rpc: Arc<dyn NodeRpc>,
        timeout: Duration,
        events: EventPublisher,
    ) -> Self {
        Self {
            membership,
            rpc,
            timeout,
            events,
        }
    }

    /// First round: collect every node's runtime report.
    ///
    /// Node failures are tolerated, even when every node fails: a silent node
    /// simply contributes nothing. Only a membership listing error fails the
    /// round.
    #[instrument(skip_all, fields(cycle_id = %cycle_id))]
    pub async fn gather(&self, cycle_id: CycleId) -> SyncResult<AggregatedState> {
        let nodes = self.membership.list_eligible_nodes().await?;
        tracing::debug!(cycle_id = %cycle_id, nodes = nodes.len(), "Gathering node state");

        let responses = self
            .broadcast(&nodes, SyncUpRequest::Gather { cycle_id })
            .await;

        let mut state = AggregatedState::new();
        for (node_id, result) in responses {
            match result {
                Ok(SyncUpResponse::Report(mut report)) => {
                    if report.node_id != node_id {
                        tracing::warn!(
                            expected = %node_id,
                            reported = %report.node_id,
                            "Node report carried a different node id"
                        );
                        report.node_id = node_id;
                    }
                    state.absorb(report);
                }
                Ok(other) => {
                    let error = ClusterError::UnexpectedResponse {
                        node_id: node_id.clone(),
                        detail: format!("{:?}", other),
                    };
                    self.node_failed(cycle_id, &node_id, &error);
                    state.mark_failed(node_id);
                }
                Err(error) => {
                    self.node_failed(cycle_id, &node_id, &error);
                    state.mark_failed(node_id);
                }
            }
        }

        if !nodes.is_empty() && state.responded_nodes.is_empty() {
            tracing::warn!(cycle_id = %cycle_id, nodes = nodes.len(), "No node answered the gather round");
        }

        Ok(state)
    }

    /// Second round: push the routing table and expired-model cleanup to the
    /// nodes that took part in the gather round. Best effort.
    #[instrument(skip_all, fields(cycle_id = %cycle_id))]
    pub async fn sync_routing(
        &self,
        cycle_id: CycleId,
        state: &AggregatedState,
    ) -> RoutingSyncOutcome {
        let nodes: Vec<NodeId> = state
            .responded_nodes
            .union(&state.failed_nodes)
            .cloned()
            .collect();

        let request = SyncUpRequest::ApplyRouting {
            cycle_id,
            routing_table: state.routing_table(),
            running_deploy_tasks: state.running_deploy_tasks.clone(),
            expired_model_ids: state.fully_expired_models(),
        };

        let mut outcome = RoutingSyncOutcome::default();
        for (node_id, result) in self.broadcast(&nodes, request).await {
            match result {
                Ok(SyncUpResponse::Applied {
                    undeployed_model_ids,
                    ..
                }) => {
                    if !undeployed_model_ids.is_empty() {
                        tracing::info!(
                            node_id = %node_id,
                            models = undeployed_model_ids.len(),
                            "Undeployed expired models"
                        );
                        self.events.emit(
                            Some(cycle_id),
                            SyncEvent::ExpiredModelsUndeployed {
                                node_id: node_id.clone(),
                                model_ids: undeployed_model_ids.iter().cloned().collect(),
                            },
                        );
                        outcome
                            .undeployed
                            .insert(node_id.clone(), undeployed_model_ids);
                    }
                    outcome.acknowledged.insert(node_id);
                }
                Ok(other) => {
                    let error = ClusterError::UnexpectedResponse {
                        node_id: node_id.clone(),
                        detail: format!("{:?}", other),
                    };
                    self.node_failed(cycle_id, &node_id, &error);
                    outcome.failed.insert(node_id);
                }
                Err(error) => {
                    self.node_failed(cycle_id, &node_id, &error);
                    outcome.failed.insert(node_id);
                }
            }
        }
        outcome
    }

    async fn broadcast(
        &self,
        nodes: &[NodeId],
        request: SyncUpRequest,
    ) -> Vec<(NodeId, ClusterResult<SyncUpResponse>)> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let calls = nodes.iter().map(|node_id| {
            let request = request.clone();
            async move {
                let result =
                    match tokio::time::timeout(self.timeout, self.rpc.sync_up(node_id, request))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ClusterError::Timeout {
                            node_id: node_id.clone(),
                            timeout_ms,
                        }),
                    };
                (node_id.clone(), result)
            }
        });
        join_all(calls).await
    }

    fn node_failed(&self, cycle_id: CycleId, node_id: &NodeId, error: &ClusterError) {
        tracing::warn!(cycle_id = %cycle_id, node_id = %node_id, error = %error, "Node failed sync-up round");
        self.events.emit(
            Some(cycle_id),
            SyncEvent::NodeUnreachable {
                node_id: node_id.clone(),
                reason: error.to_string(),
            },
        );
    }
}
