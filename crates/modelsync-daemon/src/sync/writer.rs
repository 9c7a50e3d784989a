//! Bulk write-back of model state corrections

use super::events::EventPublisher;
use super::reconciler::Correction;
use crate::storage::{BulkUpdateItem, DocumentStore};
use chrono::{DateTime, Utc};
use modelsync_types::model::{
    CURRENT_WORKER_NODE_COUNT_FIELD, LAST_UPDATED_TIME_FIELD, MODEL_STATE_FIELD,
};
use modelsync_types::{CycleId, ModelId, SyncEvent};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// What happened to one bulk correction request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    /// Items the store rejected
    pub failed: Vec<ModelId>,
    /// Set when the whole request failed
    pub request_error: Option<String>,
}

/// Writes corrections back in a single bulk request
pub struct BulkStateWriter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    events: EventPublisher,
}

impl BulkStateWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            events,
        }
    }

    /// Partial document for one correction
    pub fn partial_document(correction: &Correction, now: DateTime<Utc>) -> serde_json::Value {
        json!({
            MODEL_STATE_FIELD: correction.to_state,
            CURRENT_WORKER_NODE_COUNT_FIELD: correction.to_count,
            LAST_UPDATED_TIME_FIELD: now.timestamp_millis(),
        })
    }

    /// Submit every correction in one request. Failures are reported, not
    /// retried; the next cycle detects the same drift again.
    #[instrument(skip_all, fields(cycle_id = %cycle_id, corrections = corrections.len()))]
    pub async fn apply(&self, cycle_id: CycleId, corrections: &[Correction]) -> BulkOutcome {
        if corrections.is_empty() {
            return BulkOutcome::default();
        }

        let now = Utc::now();
        let items: Vec<BulkUpdateItem> = corrections
            .iter()
            .map(|correction| BulkUpdateItem {
                id: correction.model_id.as_str().to_string(),
                tenant_id: correction.tenant_id.clone(),
                partial: Self::partial_document(correction, now),
            })
            .collect();

        let mut outcome = BulkOutcome {
            attempted: items.len(),
            ..Default::default()
        };

        let response = match self.store.bulk_update(&self.collection, items).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    cycle_id = %cycle_id,
                    corrections = corrections.len(),
                    error = %error,
                    "Bulk model state update failed"
                );
                self.events.emit(
                    Some(cycle_id),
                    SyncEvent::BulkWriteFailed {
                        model_id: None,
                        reason: error.to_string(),
                    },
                );
                outcome.request_error = Some(error.to_string());
                return outcome;
            }
        };

        let failures: HashMap<&str, String> = response
            .failures()
            .map(|(id, error)| (id, error.to_string()))
            .collect();

        for correction in corrections {
            match failures.get(correction.model_id.as_str()) {
                Some(reason) => {
                    tracing::warn!(
                        cycle_id = %cycle_id,
                        model_id = %correction.model_id,
                        reason = %reason,
                        "Model state correction rejected"
                    );
                    self.events.emit(
                        Some(cycle_id),
                        SyncEvent::BulkWriteFailed {
                            model_id: Some(correction.model_id.clone()),
                            reason: reason.clone(),
                        },
                    );
                    outcome.failed.push(correction.model_id.clone());
                }
                None => {
                    tracing::info!(
                        cycle_id = %cycle_id,
                        model_id = %correction.model_id,
                        from = %correction.from_state,
                        to = %correction.to_state,
                        workers = correction.to_count,
                        "Corrected model state"
                    );
                    self.events.emit(
                        Some(cycle_id),
                        SyncEvent::ModelStateCorrected {
                            model_id: correction.model_id.clone(),
                            from_state: correction.from_state,
                            to_state: correction.to_state,
                            from_count: correction.from_count,
                            to_count: correction.to_count,
                        },
                    );
                    outcome.succeeded += 1;
                }
            }
        }

        outcome
    }
}
