//! Correction rules for persisted model state

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use modelsync_types::{AggregatedState, ModelId, ModelRecord, ModelState, TenantId};
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;

/// A state change to write back for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub model_id: ModelId,
    pub tenant_id: Option<TenantId>,
    pub from_state: ModelState,
    pub to_state: ModelState,
    pub from_count: u32,
    pub to_count: u32,
}

/// Scan totals and the corrections they produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub scanned: usize,
    pub corrections: Vec<Correction>,
}

/// Decides, per record, whether persisted state disagrees with the cluster
#[derive(Debug, Clone)]
pub struct Reconciler {
    grace_period: Duration,
}

impl Reconciler {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Compare one record against the aggregated runtime view.
    ///
    /// An in-flight deploy task always wins: the record is pinned to
    /// `DEPLOYING` with the live replica count, however stale it is. Other
    /// records are left alone inside the grace period.
    pub fn decide(
        &self,
        record: &ModelRecord,
        state: &AggregatedState,
        now: DateTime<Utc>,
    ) -> Option<Correction> {
        if !record.state.is_reconcilable() {
            return None;
        }

        let actual = state.worker_count(&record.model_id);

        let to_state = if state.is_deploying(&record.model_id) {
            ModelState::Deploying
        } else if self.within_grace(record, now) {
            return None;
        } else if actual == 0 {
            ModelState::DeployFailed
        } else if actual < record.planning_worker_node_count {
            ModelState::PartiallyDeployed
        } else {
            return None;
        };

        if record.state == to_state && record.current_worker_node_count == actual {
            return None;
        }

        Some(Correction {
            model_id: record.model_id.clone(),
            tenant_id: record.tenant_id.clone(),
            from_state: record.state,
            to_state,
            from_count: record.current_worker_node_count,
            to_count: actual,
        })
    }

    /// Drain a record stream, deciding each record as it arrives.
    ///
    /// The first stream error stops the refresh and is returned.
    #[instrument(skip_all)]
    pub async fn refresh<S>(
        &self,
        records: S,
        state: &AggregatedState,
        now: DateTime<Utc>,
    ) -> SyncResult<RefreshOutcome>
    where
        S: Stream<Item = SyncResult<ModelRecord>> + Unpin,
    {
        let mut records = records;
        let mut outcome = RefreshOutcome::default();

        while let Some(record) = records.next().await {
            let record = record?;
            outcome.scanned += 1;
            if let Some(correction) = self.decide(&record, state, now) {
                tracing::debug!(
                    model_id = %correction.model_id,
                    from = %correction.from_state,
                    to = %correction.to_state,
                    "Model state needs correction"
                );
                outcome.corrections.push(correction);
            }
        }

        Ok(outcome)
    }

    fn within_grace(&self, record: &ModelRecord, now: DateTime<Utc>) -> bool {
        let Some(updated) = record.last_updated_time else {
            return false;
        };
        match (now - updated).to_std() {
            Ok(age) => age < self.grace_period,
            // Updated "in the future": clock skew, treat as fresh
            Err(_) => true,
        }
    }
}
