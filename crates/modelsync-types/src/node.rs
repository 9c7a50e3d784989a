//! Per-node runtime reports and their cluster-wide aggregation

use crate::{ModelId, NodeId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One node's view of its local model runtime, produced for a single cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: NodeId,

    /// Models fully deployed on this node
    #[serde(default)]
    pub deployed_model_ids: BTreeSet<ModelId>,

    /// Models with a deploy task currently running on this node
    #[serde(default)]
    pub running_deploy_model_ids: BTreeSet<ModelId>,

    /// Deploy tasks currently running on this node
    #[serde(default)]
    pub running_deploy_task_ids: BTreeSet<TaskId>,

    /// Models whose local copy has expired and may be cleaned up
    #[serde(default)]
    pub expired_model_ids: BTreeSet<ModelId>,
}

impl NodeReport {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            deployed_model_ids: BTreeSet::new(),
            running_deploy_model_ids: BTreeSet::new(),
            running_deploy_task_ids: BTreeSet::new(),
            expired_model_ids: BTreeSet::new(),
        }
    }

    pub fn with_deployed<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelId>,
    {
        self.deployed_model_ids
            .extend(models.into_iter().map(Into::into));
        self
    }

    pub fn with_deploying(mut self, model_id: impl Into<ModelId>, task_id: impl Into<TaskId>) -> Self {
        self.running_deploy_model_ids.insert(model_id.into());
        self.running_deploy_task_ids.insert(task_id.into());
        self
    }

    pub fn with_expired<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelId>,
    {
        self.expired_model_ids
            .extend(models.into_iter().map(Into::into));
        self
    }
}

/// Cluster-wide fold of all node reports of one cycle
///
/// Nodes that did not answer simply contribute no entries, so their models
/// look under-replicated to the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedState {
    /// model -> nodes reporting the model deployed
    pub model_worker_nodes: BTreeMap<ModelId, BTreeSet<NodeId>>,

    /// model -> nodes with a deploy task for the model in flight
    pub deploying_models: BTreeMap<ModelId, BTreeSet<NodeId>>,

    /// deploy task -> nodes running it
    pub running_deploy_tasks: BTreeMap<TaskId, BTreeSet<NodeId>>,

    /// model -> nodes reporting their copy expired
    pub expired_models: BTreeMap<ModelId, BTreeSet<NodeId>>,

    /// Nodes that answered the gather round
    pub responded_nodes: BTreeSet<NodeId>,

    /// Nodes that errored or timed out
    pub failed_nodes: BTreeSet<NodeId>,
}

impl AggregatedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a set of reports into a fresh aggregate.
    pub fn from_reports<I>(reports: I) -> Self
    where
        I: IntoIterator<Item = NodeReport>,
    {
        let mut state = Self::new();
        for report in reports {
            state.absorb(report);
        }
        state
    }

    /// Fold one node report into the aggregate.
    pub fn absorb(&mut self, report: NodeReport) {
        let node = report.node_id;

        for model in report.deployed_model_ids {
            self.model_worker_nodes
                .entry(model)
                .or_default()
                .insert(node.clone());
        }
        for model in report.running_deploy_model_ids {
            self.deploying_models
                .entry(model)
                .or_default()
                .insert(node.clone());
        }
        for task in report.running_deploy_task_ids {
            self.running_deploy_tasks
                .entry(task)
                .or_default()
                .insert(node.clone());
        }
        for model in report.expired_model_ids {
            self.expired_models
                .entry(model)
                .or_default()
                .insert(node.clone());
        }

        self.failed_nodes.remove(&node);
        self.responded_nodes.insert(node);
    }

    /// Record a node that did not produce a report.
    pub fn mark_failed(&mut self, node: NodeId) {
        if !self.responded_nodes.contains(&node) {
            self.failed_nodes.insert(node);
        }
    }

    /// Forget the copies a node reported undeploying after the gather round.
    pub fn remove_workers<'a, I>(&mut self, node: &NodeId, models: I)
    where
        I: IntoIterator<Item = &'a ModelId>,
    {
        for model in models {
            if let Some(workers) = self.model_worker_nodes.get_mut(model) {
                workers.remove(node);
                if workers.is_empty() {
                    self.model_worker_nodes.remove(model);
                }
            }
        }
    }

    /// Number of nodes currently reporting the model deployed.
    pub fn worker_count(&self, model_id: &ModelId) -> u32 {
        self.model_worker_nodes
            .get(model_id)
            .map(|nodes| u32::try_from(nodes.len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    /// Whether any node has a deploy task for the model in flight.
    pub fn is_deploying(&self, model_id: &ModelId) -> bool {
        self.deploying_models
            .get(model_id)
            .is_some_and(|nodes| !nodes.is_empty())
    }

    /// Models whose copy expired on every node hosting them.
    ///
    /// A model that is still fresh on at least one worker is kept; cleanup
    /// only happens once the whole cluster agrees it is stale.
    pub fn fully_expired_models(&self) -> BTreeSet<ModelId> {
        self.expired_models
            .iter()
            .filter(|(model, expired_on)| match self.model_worker_nodes.get(*model) {
                Some(workers) => workers.is_subset(expired_on),
                None => true,
            })
            .map(|(model, _)| model.clone())
            .collect()
    }

    /// Routing table to push back to the nodes: deployed models minus the
    /// fully expired ones.
    pub fn routing_table(&self) -> BTreeMap<ModelId, BTreeSet<NodeId>> {
        let expired = self.fully_expired_models();
        self.model_worker_nodes
            .iter()
            .filter(|(model, _)| !expired.contains(*model))
            .map(|(model, nodes)| (model.clone(), nodes.clone()))
            .collect()
    }
}
