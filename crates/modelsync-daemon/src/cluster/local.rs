//! In-process cluster for development and testing

use super::{ClusterMembership, NodeRpc};
use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use dashmap::DashMap;
use modelsync_types::{ModelId, NodeId, NodeReport, SyncUpRequest, SyncUpResponse, TaskId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runtime state of one simulated node
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    /// Included in membership listings
    pub eligible: bool,
    /// Answers requests
    pub reachable: bool,
    /// Artificial latency before answering
    pub response_delay: Option<Duration>,
    pub deployed: BTreeSet<ModelId>,
    /// task -> model being deployed
    pub deploying: BTreeMap<TaskId, ModelId>,
    pub expired: BTreeSet<ModelId>,
    /// Last routing table pushed by a sync-up cycle
    pub routing_table: BTreeMap<ModelId, BTreeSet<NodeId>>,
    /// Last cluster-wide running task view pushed by a sync-up cycle
    pub known_deploy_tasks: BTreeMap<TaskId, BTreeSet<NodeId>>,
}

impl Default for NodeRuntime {
    fn default() -> Self {
        Self {
            eligible: true,
            reachable: true,
            response_delay: None,
            deployed: BTreeSet::new(),
            deploying: BTreeMap::new(),
            expired: BTreeSet::new(),
            routing_table: BTreeMap::new(),
            known_deploy_tasks: BTreeMap::new(),
        }
    }
}

impl NodeRuntime {
    fn report(&self, node_id: &NodeId) -> NodeReport {
        NodeReport {
            node_id: node_id.clone(),
            deployed_model_ids: self.deployed.clone(),
            running_deploy_model_ids: self.deploying.values().cloned().collect(),
            running_deploy_task_ids: self.deploying.keys().cloned().collect(),
            expired_model_ids: self.expired.clone(),
        }
    }

    fn apply(
        &mut self,
        routing_table: BTreeMap<ModelId, BTreeSet<NodeId>>,
        running_deploy_tasks: BTreeMap<TaskId, BTreeSet<NodeId>>,
        expired_model_ids: &BTreeSet<ModelId>,
    ) -> BTreeSet<ModelId> {
        self.routing_table = routing_table;
        self.known_deploy_tasks = running_deploy_tasks;

        let mut undeployed = BTreeSet::new();
        for model in expired_model_ids {
            let held = self.deployed.remove(model);
            let expired = self.expired.remove(model);
            if held || expired {
                undeployed.insert(model.clone());
            }
        }
        undeployed
    }
}

/// A set of nodes living in this process
///
/// Implements both [`ClusterMembership`] and [`NodeRpc`], so the daemon can
/// run a full sync-up cycle without a real transport.
#[derive(Debug, Clone, Default)]
pub struct LocalCluster {
    nodes: Arc<DashMap<NodeId, NodeRuntime>>,
    membership_down: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster with one empty node per id
    pub fn with_nodes<I, N>(ids: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let cluster = Self::new();
        for id in ids {
            cluster.add_node(id);
        }
        cluster
    }

    pub fn add_node(&self, node_id: impl Into<NodeId>) {
        self.nodes.entry(node_id.into()).or_default();
    }

    /// Mutate a node's runtime; no-op if the node is unknown
    pub fn update<F>(&self, node_id: &NodeId, f: F)
    where
        F: FnOnce(&mut NodeRuntime),
    {
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            f(node.value_mut());
        }
    }

    pub fn node(&self, node_id: &NodeId) -> Option<NodeRuntime> {
        self.nodes.get(node_id).map(|node| node.value().clone())
    }

    pub fn deploy(&self, node_id: &NodeId, model_id: impl Into<ModelId>) {
        let model_id = model_id.into();
        self.update(node_id, |node| {
            node.deployed.insert(model_id);
        });
    }

    pub fn start_deploy_task(
        &self,
        node_id: &NodeId,
        model_id: impl Into<ModelId>,
        task_id: impl Into<TaskId>,
    ) {
        let (model_id, task_id) = (model_id.into(), task_id.into());
        self.update(node_id, |node| {
            node.deploying.insert(task_id, model_id);
        });
    }

    pub fn expire(&self, node_id: &NodeId, model_id: impl Into<ModelId>) {
        let model_id = model_id.into();
        self.update(node_id, |node| {
            node.expired.insert(model_id);
        });
    }

    pub fn set_reachable(&self, node_id: &NodeId, reachable: bool) {
        self.update(node_id, |node| node.reachable = reachable);
    }

    pub fn set_response_delay(&self, node_id: &NodeId, delay: Option<Duration>) {
        self.update(node_id, |node| node.response_delay = delay);
    }

    /// Make membership listings fail
    pub fn set_membership_down(&self, down: bool) {
        self.membership_down.store(down, Ordering::SeqCst);
    }

    /// Total sync-up requests received across all nodes
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterMembership for LocalCluster {
    async fn list_eligible_nodes(&self) -> ClusterResult<Vec<NodeId>> {
        if self.membership_down.load(Ordering::SeqCst) {
            return Err(ClusterError::Membership(
                "local membership marked down".to_string(),
            ));
        }

        let mut nodes: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().eligible)
            .map(|entry| entry.key().clone())
            .collect();
        nodes.sort();
        Ok(nodes)
    }
}

#[async_trait]
impl NodeRpc for LocalCluster {
    async fn sync_up(
        &self,
        node_id: &NodeId,
        request: SyncUpRequest,
    ) -> ClusterResult<SyncUpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let unreachable = || ClusterError::Transport {
            node_id: node_id.clone(),
            reason: "node not reachable".to_string(),
        };

        // Read the delay without holding the shard lock across the sleep.
        let delay = match self.nodes.get(node_id) {
            Some(node) if node.reachable => node.response_delay,
            _ => return Err(unreachable()),
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut node = self.nodes.get_mut(node_id).ok_or_else(unreachable)?;
        if !node.reachable {
            return Err(unreachable());
        }

        let response = match request {
            SyncUpRequest::Gather { .. } => SyncUpResponse::Report(node.report(node_id)),
            SyncUpRequest::ApplyRouting {
                routing_table,
                running_deploy_tasks,
                expired_model_ids,
                ..
            } => SyncUpResponse::Applied {
                node_id: node_id.clone(),
                undeployed_model_ids: node.apply(
                    routing_table,
                    running_deploy_tasks,
                    &expired_model_ids,
                ),
            },
        };
        Ok(response)
    }
}
