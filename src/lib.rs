//! Snapshot and restore coordinator for a Raft replicated, sharded store.
//!
//! The [`SnapshotCoordinator`] owns snapshots, snapshot schedules and
//! restorations. Every decision is written to the replicated log through a
//! [`Replicator`]; the committed entries are applied back on every replica.
//! Tablet work is fanned out to workers through a [`TabletFleet`].

mod config;
mod constants;
mod coordinator;
mod core;
mod errors;
mod metrics;
mod network;
mod replication;
mod storage;
mod type_config;
pub mod utils;

pub use core::*;

pub use config::*;
pub use constants::UNKNOWN_TERM;
pub use coordinator::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use replication::*;
pub use storage::*;
pub use type_config::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
