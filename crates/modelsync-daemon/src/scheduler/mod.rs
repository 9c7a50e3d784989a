//! Cron scheduler for sync-up cycles

use crate::sync::SyncUpCron;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Fires sync-up cycles on an interval and on demand.
///
/// Each cycle is spawned onto the runtime; the timer never waits for a cycle
/// to finish. Overlap is handled by the cycle's own gate.
pub struct Scheduler {
    period: Duration,
    cron: Arc<SyncUpCron>,
    trigger_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(period: Duration, cron: Arc<SyncUpCron>) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let scheduler = Arc::new(Self {
            period,
            cron,
            trigger_tx,
            running: Arc::new(RwLock::new(false)),
        });

        (scheduler, trigger_rx)
    }

    /// Request an immediate cycle; returns false if one is already pending
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run the timer loop until [`Scheduler::stop`] is called
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(period_secs = self.period.as_secs(), "Scheduler started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(_) = trigger_rx.recv() => tracing::debug!("Manual sync-up trigger"),
                else => break,
            }

            if !*self.running.read().await {
                break;
            }
            self.spawn_cycle();
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    fn spawn_cycle(&self) {
        let cron = self.cron.clone();
        tokio::spawn(async move {
            cron.run_cycle().await;
        });
    }
}
