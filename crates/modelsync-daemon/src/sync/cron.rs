//! One sync-up cycle, end to end

use super::events::EventPublisher;
use super::gate::ConcurrencyGate;
use super::gather::{NodeStateGatherer, RoutingSyncOutcome};
use super::master_key::MasterKeyBootstrapper;
use super::reconciler::{Correction, Reconciler};
use super::scanner::ModelStateIndexScanner;
use super::writer::{BulkOutcome, BulkStateWriter};
use crate::cluster::{ClusterMembership, NodeRpc};
use crate::config::SyncConfig;
use crate::storage::DocumentStore;
use chrono::{DateTime, Utc};
use modelsync_crypto::Encryptor;
use modelsync_types::{CycleId, NodeId, SyncEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::Instrument;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    /// The model collection does not exist yet
    NoModelIndex,
    /// Another cycle held the gate
    Skipped,
    Aborted { reason: String },
}

/// Summary of one cycle, served by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub responded_nodes: BTreeSet<NodeId>,
    pub failed_nodes: BTreeSet<NodeId>,
    pub routing: Option<RoutingSyncOutcome>,
    pub scanned: usize,
    pub corrections: Vec<Correction>,
    pub bulk: Option<BulkOutcome>,
}

impl CycleReport {
    fn new(cycle_id: CycleId, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            finished_at: started_at,
            outcome: CycleOutcome::Completed,
            responded_nodes: BTreeSet::new(),
            failed_nodes: BTreeSet::new(),
            routing: None,
            scanned: 0,
            corrections: Vec::new(),
            bulk: None,
        }
    }
}

/// Runs reconciliation cycles against the cluster and the model collection
pub struct SyncUpCron {
    bootstrapper: MasterKeyBootstrapper,
    scanner: ModelStateIndexScanner,
    gatherer: NodeStateGatherer,
    reconciler: Reconciler,
    writer: BulkStateWriter,
    gate: ConcurrencyGate,
    events: EventPublisher,
    last_report: RwLock<Option<CycleReport>>,
}

impl SyncUpCron {
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        membership: Arc<dyn ClusterMembership>,
        rpc: Arc<dyn NodeRpc>,
        encryptor: Arc<dyn Encryptor>,
        events: EventPublisher,
    ) -> Self {
        Self {
            bootstrapper: MasterKeyBootstrapper::new(
                store.clone(),
                encryptor,
                config.config_collection.clone(),
                config.master_key_id.clone(),
                events.clone(),
            ),
            scanner: ModelStateIndexScanner::new(
                store.clone(),
                config.model_collection.clone(),
                config.scan_page_size,
            ),
            gatherer: NodeStateGatherer::new(
                membership,
                rpc,
                config.gather_timeout(),
                events.clone(),
            ),
            reconciler: Reconciler::new(config.grace_period()),
            writer: BulkStateWriter::new(store, config.model_collection.clone(), events.clone()),
            gate: ConcurrencyGate::new(),
            events,
            last_report: RwLock::new(None),
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn master_key_fingerprint(&self) -> Option<String> {
        self.bootstrapper.installed_fingerprint()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Run one cycle. Never fails: every error ends up in the report.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = CycleId::generate();
        let span = tracing::info_span!("sync_up_cycle", cycle_id = %cycle_id);
        let report = self.run_stages(cycle_id).instrument(span).await;

        *self.last_report.write().await = Some(report.clone());
        report
    }

    async fn run_stages(&self, cycle_id: CycleId) -> CycleReport {
        let timer = Instant::now();
        let mut report = CycleReport::new(cycle_id, Utc::now());
        self.events.emit(Some(cycle_id), SyncEvent::CycleStarted);

        if let Err(error) = self.bootstrapper.ensure().await {
            return self.abort(report, format!("master key bootstrap failed: {}", error));
        }

        match self.scanner.exists().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(collection = %self.scanner.collection(), "No model collection, nothing to sync");
                report.outcome = CycleOutcome::NoModelIndex;
                report.finished_at = Utc::now();
                return report;
            }
            Err(error) => {
                return self.abort(report, format!("model collection check failed: {}", error));
            }
        }

        let mut state = match self.gatherer.gather(cycle_id).await {
            Ok(state) => state,
            Err(error) => return self.abort(report, format!("gather failed: {}", error)),
        };
        report.responded_nodes = state.responded_nodes.clone();
        report.failed_nodes = state.failed_nodes.clone();

        let routing = self.gatherer.sync_routing(cycle_id, &state).await;
        // Reconcile against what the nodes hold after the cleanup round.
        for (node_id, models) in &routing.undeployed {
            state.remove_workers(node_id, models);
        }
        report.routing = Some(routing);

        let Some(_permit) = self.gate.try_enter() else {
            let reason = "previous refresh still running".to_string();
            tracing::debug!("Skipping model state refresh: {}", reason);
            self.events
                .emit(Some(cycle_id), SyncEvent::CycleSkipped { reason });
            report.outcome = CycleOutcome::Skipped;
            report.finished_at = Utc::now();
            return report;
        };

        let refreshed = self
            .reconciler
            .refresh(self.scanner.scan_reconcilable(), &state, Utc::now())
            .await;
        let outcome = match refreshed {
            Ok(outcome) => outcome,
            Err(error) => return self.abort(report, format!("model state scan failed: {}", error)),
        };

        report.scanned = outcome.scanned;
        if !outcome.corrections.is_empty() {
            report.bulk = Some(self.writer.apply(cycle_id, &outcome.corrections).await);
        }
        report.corrections = outcome.corrections;

        let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            scanned = report.scanned,
            corrected = report.corrections.len(),
            nodes = report.responded_nodes.len(),
            duration_ms,
            "Sync-up cycle completed"
        );
        self.events.emit(
            Some(cycle_id),
            SyncEvent::CycleCompleted {
                scanned: report.scanned,
                corrected: report.corrections.len(),
                duration_ms,
            },
        );
        report.finished_at = Utc::now();
        report
    }

    fn abort(&self, mut report: CycleReport, reason: String) -> CycleReport {
        tracing::error!(reason = %reason, "Sync-up cycle aborted");
        self.events.emit(
            Some(report.cycle_id),
            SyncEvent::CycleAborted {
                reason: reason.clone(),
            },
        );
        report.outcome = CycleOutcome::Aborted { reason };
        report.finished_at = Utc::now();
        report
    }
}
