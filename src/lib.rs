//! Peer Mapper Library
//!
//! A pool of peer workers that runs map-only batch jobs over line-oriented
//! input. There is no central master: any member can accept a job, every
//! member can track others, and work held by a failed or slow member moves
//! to an idle one.
//!
//! ## Architecture Modules
//! - **`job`**: splits, assignments, partitioning and the controller ring.
//! - **`mapper`**: named map functions, `word_count` built in.
//! - **`membership`**: the per-node member table, liveness timers, pause gates.
//! - **`rpc`**: the `WorkerRpc` seam with HTTP and in-process transports.
//! - **`sink`**: the client-side collaborator that serves input and stores results.
//! - **`worker`**: `WorkerNode`, the engine, tracker and controller of one peer.
//! - **`config`**, **`error`**, **`telemetry`**: ambient plumbing.

pub mod config;
pub mod error;
pub mod job;
pub mod mapper;
pub mod membership;
pub mod rpc;
pub mod sink;
pub mod telemetry;
pub mod worker;

pub use config::NodeConfig;
pub use error::{ClusterError, Result};
pub use worker::{NodeEvent, WorkerNode};
