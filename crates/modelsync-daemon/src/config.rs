//! Configuration for modelsync-daemon

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Sync-up cycle configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

/// Sync-up cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between scheduled cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Records updated more recently than this are left alone
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Per-node timeout for each broadcast round
    #[serde(default = "default_gather_timeout")]
    pub gather_timeout_ms: u64,

    /// Page size for the model state scan
    #[serde(default = "default_page_size")]
    pub scan_page_size: usize,

    /// Collection holding model records
    #[serde(default = "default_model_collection")]
    pub model_collection: String,

    /// Collection holding the master key document
    #[serde(default = "default_config_collection")]
    pub config_collection: String,

    /// Document id of the master key
    #[serde(default = "default_master_key_id")]
    pub master_key_id: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            grace_period_secs: default_grace_period(),
            gather_timeout_ms: default_gather_timeout(),
            scan_page_size: default_page_size(),
            model_collection: default_model_collection(),
            config_collection: default_config_collection(),
            master_key_id: default_master_key_id(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_millis(self.gather_timeout_ms)
    }
}

/// Local cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Id this process registers under in the local cluster
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

fn default_grace_period() -> u64 {
    30
}

fn default_gather_timeout() -> u64 {
    5_000
}

fn default_page_size() -> usize {
    100
}

fn default_model_collection() -> String {
    ".plugins-ml-model".to_string()
}

fn default_config_collection() -> String {
    ".plugins-ml-config".to_string()
}

fn default_master_key_id() -> String {
    "master_key".to_string()
}

fn default_node_id() -> String {
    "node-0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // MODELSYNC_SYNC__INTERVAL_SECS=5 -> sync.interval_secs
        builder = builder.add_source(
            config::Environment::with_prefix("MODELSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.cluster.node_id, "node-0");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_sync_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.grace_period(), Duration::from_secs(30));
        assert_eq!(config.gather_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.model_collection, ".plugins-ml-model");
        assert_eq!(config.config_collection, ".plugins-ml-config");
        assert_eq!(config.master_key_id, "master_key");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SyncConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.sync.scan_page_size, 100);
    }
}
