//! Worker Node
//!
//! A worker is one peer of the pool. It plays three roles at once:
//!
//! - **Execution engine** (`engine`): runs map work split by split, reporting
//!   progress to its controller and completion to its master tracker.
//! - **Tracker** (`tracker`, `heartbeat`): admits members, deals jobs, watches
//!   lifeproofs, and re-homes the work of failed or slow members. Its own
//!   lifeproofs go to its master tracker, with the cached father as fail-over.
//! - **Controller** (`controller`): caches the input and partial output of
//!   the one member it backs up.
//!
//! `hooks` holds the fault-injection switches; `events` is the observer feed.

pub mod context;
pub mod controller;
pub mod engine;
pub mod events;
pub mod heartbeat;
pub mod hooks;
pub mod node;
pub mod tracker;

pub use events::NodeEvent;
pub use node::WorkerNode;
