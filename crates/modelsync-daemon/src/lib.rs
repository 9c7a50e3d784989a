//! Model sync-up daemon library
//!
//! Keeps the persisted deployment state of ML models in line with what the
//! cluster nodes actually host:
//! - Sync-up pipeline (gather, reconcile, bulk write-back, master key bootstrap)
//! - Storage and cluster collaborators with in-memory implementations
//! - Cron scheduler
//! - REST status surface and server lifecycle

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod sync;

pub use config::DaemonConfig;
pub use error::{ApiError, ClusterError, DaemonError, StorageError, SyncError};
pub use scheduler::Scheduler;
pub use server::Server;
pub use storage::{DocumentStore, InMemoryDocumentStore};
pub use sync::{CycleOutcome, CycleReport, SyncUpCron};
