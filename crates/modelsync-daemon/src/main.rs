//! modelsyncd - model sync-up daemon
//!
//! Periodically reconciles persisted ML model deployment state against the
//! runtime state reported by cluster nodes, and exposes the cycle status over
//! REST.

use clap::Parser;
use modelsync_daemon::error::{DaemonError, DaemonResult};
use modelsync_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Model sync-up daemon CLI
#[derive(Parser)]
#[command(name = "modelsyncd")]
#[command(about = "Model sync-up daemon - reconciles ML model deployment state", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MODELSYNC_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "MODELSYNC_LISTEN_ADDR")]
    listen: Option<String>,

    /// Local node id
    #[arg(long, env = "MODELSYNC_NODE_ID")]
    node_id: Option<String>,

    /// Log level
    #[arg(long, env = "MODELSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MODELSYNC_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(node_id) = cli.node_id {
        config.cluster.node_id = node_id;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        node_id = %config.cluster.node_id,
        "Starting modelsyncd"
    );

    let server = Server::new(config)?;
    server.run().await
}
