//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::cluster::LocalCluster;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::scheduler::Scheduler;
use crate::storage::{DocumentStore, InMemoryDocumentStore};
use crate::sync::{EventPublisher, SyncUpCron};
use modelsync_crypto::{Encryptor, MasterKeyEncryptor};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// Model sync-up daemon server
pub struct Server {
    config: DaemonConfig,
    cron: Arc<SyncUpCron>,
    scheduler: Arc<Scheduler>,
    trigger_rx: mpsc::Receiver<()>,
}

impl Server {
    /// Server backed by the in-memory store and a single-node local cluster
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let cluster = LocalCluster::with_nodes([config.cluster.node_id.as_str()]);
        let encryptor: Arc<dyn Encryptor> = Arc::new(MasterKeyEncryptor::new());

        Self::with_collaborators(
            config,
            store,
            Arc::new(cluster.clone()),
            Arc::new(cluster),
            encryptor,
        )
    }

    /// Server wired to caller-provided collaborators
    pub fn with_collaborators(
        config: DaemonConfig,
        store: Arc<dyn DocumentStore>,
        membership: Arc<dyn crate::cluster::ClusterMembership>,
        rpc: Arc<dyn crate::cluster::NodeRpc>,
        encryptor: Arc<dyn Encryptor>,
    ) -> DaemonResult<Self> {
        if config.sync.scan_page_size == 0 {
            return Err(DaemonError::Config(
                "sync.scan_page_size must be positive".to_string(),
            ));
        }

        let (event_tx, _) = broadcast::channel(1000);
        let cron = Arc::new(SyncUpCron::new(
            &config.sync,
            store,
            membership,
            rpc,
            encryptor,
            EventPublisher::new(event_tx),
        ));
        let (scheduler, trigger_rx) = Scheduler::new(config.sync.interval(), cron.clone());

        Ok(Self {
            config,
            cron,
            scheduler,
            trigger_rx,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.cron.clone(), self.scheduler.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Model sync daemon listening on {}", addr);
        tracing::info!(
            interval_secs = self.config.sync.interval_secs,
            model_collection = %self.config.sync.model_collection,
            "Sync-up scheduler configured"
        );

        // Start scheduler in background
        let scheduler = self.scheduler.clone();
        let trigger_rx = self.trigger_rx;
        tokio::spawn(async move {
            scheduler.start(trigger_rx).await;
        });

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Model sync daemon shutting down");

        self.scheduler.stop().await;

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_rejects_zero_page_size() {
        let config = DaemonConfig {
            sync: SyncConfig {
                scan_page_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(Server::new(config), Err(DaemonError::Config(_))));
    }

    #[tokio::test]
    async fn test_default_server_builds() {
        let server = Server::new(DaemonConfig::default()).unwrap();
        assert!(server.cron.last_report().await.is_none());
        assert!(!server.scheduler.is_running().await);
    }
}
