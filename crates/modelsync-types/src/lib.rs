//! Model Sync-Up Types - core types for ML model state reconciliation
//!
//! The sync-up loop keeps the persisted deployment state of ML models in line
//! with what the cluster nodes actually host. This crate holds the data model
//! shared by the daemon, the node-side handlers and their tests.
//!
//! ## Key Concepts
//!
//! - **ModelRecord**: persisted deployment metadata of one model
//! - **NodeReport**: one node's local runtime view, produced per cycle
//! - **AggregatedState**: cluster-wide fold of all node reports of a cycle
//! - **MasterKeyRecord**: the singleton cluster-wide encryption key document
//! - **SyncUpRequest / SyncUpResponse**: the broadcast wire messages
//! - **Events**: observability stream of the reconciliation loop

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod ids;
pub mod model;
pub mod node;
pub mod sync_up;

pub use events::{EventSeverity, SyncEvent, SyncEventEnvelope};
pub use ids::{CycleId, ModelId, NodeId, TaskId, TenantId};
pub use model::{
    MasterKeyRecord, ModelRecord, ModelRecordError, ModelState, RECONCILABLE_STATES,
};
pub use node::{AggregatedState, NodeReport};
pub use sync_up::{SyncUpRequest, SyncUpResponse};
