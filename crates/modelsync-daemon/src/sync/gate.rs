//! Single-flight gate around the refresh and apply stage

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Non-blocking mutual exclusion for the state refresh.
///
/// At most one [`GatePermit`] exists at a time. A cycle that cannot enter
/// skips the stage instead of waiting.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

/// Held while the refresh runs; dropping it reopens the gate
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Enter the gate if no other holder is inside
    pub fn try_enter(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    pub fn is_open(&self) -> bool {
        self.semaphore.available_permits() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let gate = ConcurrencyGate::new();
        let permit = gate.try_enter();
        assert!(permit.is_some());
        assert!(!gate.is_open());
        assert!(gate.try_enter().is_none());

        drop(permit);
        assert!(gate.is_open());
        assert!(gate.try_enter().is_some());
    }

    #[tokio::test]
    async fn test_clones_share_the_gate() {
        let gate = ConcurrencyGate::new();
        let other = gate.clone();
        let _permit = gate.try_enter().unwrap();

        let entered = tokio::spawn(async move { other.try_enter().is_some() })
            .await
            .unwrap();
        assert!(!entered);
    }
}
