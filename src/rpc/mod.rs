//! Worker-to-Worker Calls
//!
//! Every cross-node interaction goes through [`WorkerRpc`], so a call to a
//! peer is always an explicit operation that can fail. Handles come from a
//! [`Directory`] that resolves opaque addresses.
//!
//! ## Transports
//! - **`http`**: axum server (`handlers`) and reqwest client, bincode bodies.
//! - **`local`**: weak pointers between nodes of one process; used to run a
//!   whole pool in tests and demos.

pub mod handlers;
pub mod http;
pub mod local;
pub mod protocol;
pub mod service;

pub use http::{HttpDirectory, HttpWorkerClient};
pub use local::{LocalDirectory, LocalPeer};
pub use protocol::{
    JoinKind, OutputUpdate, ResumeContext, SplitsUpdate, StatusReport, SubmitContext,
    TrackerLinks, WorkReport, WorkerStatus,
};
pub use service::{Directory, WorkerRpc};

#[cfg(test)]
mod tests;
