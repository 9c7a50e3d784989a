//! Event fan-out for the sync-up cycle

use modelsync_types::{CycleId, SyncEvent, SyncEventEnvelope};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Default number of envelopes kept for the recent-events endpoint
pub const DEFAULT_HISTORY: usize = 256;

/// Publishes sync events to live subscribers and keeps a short history
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<SyncEventEnvelope>,
    history: Arc<Mutex<VecDeque<SyncEventEnvelope>>>,
    capacity: usize,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<SyncEventEnvelope>) -> Self {
        Self::with_history(tx, DEFAULT_HISTORY)
    }

    pub fn with_history(tx: broadcast::Sender<SyncEventEnvelope>, capacity: usize) -> Self {
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Emit an event for a cycle
    pub fn emit(&self, cycle_id: Option<CycleId>, event: SyncEvent) {
        let mut envelope = SyncEventEnvelope::new(event);
        if let Some(cycle_id) = cycle_id {
            envelope = envelope.with_cycle(cycle_id);
        }

        if let Ok(mut history) = self.history.lock() {
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }

        // No live subscribers is fine
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEventEnvelope> {
        self.tx.subscribe()
    }

    /// Most recent envelopes, newest last
    pub fn recent(&self, limit: usize) -> Vec<SyncEventEnvelope> {
        match self.history.lock() {
            Ok(history) => {
                let skip = history.len().saturating_sub(limit);
                history.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }
}
