//! Entity state machines owned by the coordinator.
//!
//! None of the types here lock, log to the replicator or talk to workers:
//! they are plain state mutated under the coordinator mutex, with `now`
//! passed in explicitly so that every replica computes the same result.

mod hybrid_time;
mod ids;
mod restoration_state;
mod schedule_state;
mod snapshot_state;
mod state_with_tablets;

pub use hybrid_time::*;
pub use ids::*;
pub use restoration_state::*;
pub use schedule_state::*;
pub use snapshot_state::*;
pub use state_with_tablets::*;
