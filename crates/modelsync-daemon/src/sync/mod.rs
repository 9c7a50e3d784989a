//! Model state sync-up pipeline
//!
//! One cycle runs these stages in order:
//!
//! 1. make sure the cluster master key exists and is installed locally
//! 2. check the model collection exists
//! 3. gather every node's runtime report, then push the routing table back
//! 4. behind the single-flight gate, scan reconcilable records, decide
//!    corrections and write them back in one bulk request

mod cron;
mod events;
mod gate;
mod gather;
mod master_key;
mod reconciler;
mod scanner;
mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use cron::{CycleOutcome, CycleReport, SyncUpCron};
pub use events::EventPublisher;
pub use gate::{ConcurrencyGate, GatePermit};
pub use gather::{NodeStateGatherer, RoutingSyncOutcome};
pub use master_key::{MasterKeyBootstrapper, MasterKeyStatus};
pub use reconciler::{Correction, Reconciler, RefreshOutcome};
pub use scanner::ModelStateIndexScanner;
pub use writer::{BulkOutcome, BulkStateWriter};
