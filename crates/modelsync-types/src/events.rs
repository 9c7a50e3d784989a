//! Event types for sync-up observability
//!
//! Events give operators a unified stream of what each reconciliation cycle
//! decided and which failures it swallowed.

use crate::{CycleId, ModelId, ModelState, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all sync-up events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Cycle the event belongs to, if any
    pub cycle_id: Option<CycleId>,

    /// The actual event
    pub event: SyncEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Sync-up events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    // ═══════════════════════════════════════════════════════════════════
    // CYCLE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Cycle started
    CycleStarted,

    /// Cycle skipped because a previous one still holds the gate
    CycleSkipped { reason: String },

    /// Cycle aborted before reconciling
    CycleAborted { reason: String },

    /// Cycle finished
    CycleCompleted {
        scanned: usize,
        corrected: usize,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // NODE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Node did not answer a broadcast round
    NodeUnreachable { node_id: NodeId, reason: String },

    /// Expired models were undeployed on a node
    ExpiredModelsUndeployed {
        node_id: NodeId,
        model_ids: Vec<ModelId>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // MODEL STATE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// A model record was corrected
    ModelStateCorrected {
        model_id: ModelId,
        from_state: ModelState,
        to_state: ModelState,
        from_count: u32,
        to_count: u32,
    },

    /// Bulk correction write failed (whole request or one item)
    BulkWriteFailed {
        model_id: Option<ModelId>,
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // MASTER KEY EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// This process created the cluster master key
    MasterKeyCreated { fingerprint: String },

    /// This process adopted a master key created elsewhere
    MasterKeyAdopted { fingerprint: String },
}

impl SyncEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: SyncEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            cycle_id: None,
            event,
        }
    }

    /// Attach the owning cycle
    pub fn with_cycle(mut self, cycle_id: CycleId) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    fn infer_severity(event: &SyncEvent) -> EventSeverity {
        match event {
            SyncEvent::CycleAborted { .. } | SyncEvent::BulkWriteFailed { .. } => {
                EventSeverity::Error
            }
            SyncEvent::NodeUnreachable { .. } => EventSeverity::Warning,
            SyncEvent::CycleSkipped { .. } | SyncEvent::CycleStarted => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}
