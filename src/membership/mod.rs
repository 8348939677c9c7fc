//! Membership & Liveness Module
//!
//! Every node keeps its own table of known peers. A member joining through a
//! tracker becomes that tracker's responsibility: the tracker holds a liveness
//! timer for it and records the work it owns. Members learned through
//! propagation are known but not monitored.
//!
//! ## Pieces
//! - **`table`**: idempotent insert, removal, and the atomic "hand orphaned
//!   work to an idle member" step that keeps ownership exclusive.
//! - **`timer`**: one-shot liveness timer reset by lifeproofs.
//! - **`gate`**: cooperative pause flag shared by the fault-injection hooks.

pub mod gate;
pub mod table;
pub mod timer;
pub mod types;

pub use gate::PauseGate;
pub use table::MembershipTable;
pub use timer::LivenessTimer;
pub use types::{InsertOutcome, MemberInfo, MemberRecord};

#[cfg(test)]
mod tests;
