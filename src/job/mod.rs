//! Job Model
//!
//! Splits, assignments, and the two pure pieces of job planning:
//!
//! - **`partitioner`**: turns a line count and a requested split count into
//!   contiguous, non-overlapping line ranges.
//! - **`assigner`**: deals those splits over the known members and computes the
//!   controller (backup owner) of each member.

pub mod assigner;
pub mod partitioner;
pub mod types;

pub use assigner::{controller_for, deal_splits};
pub use partitioner::partition;
pub use types::{Assignment, JobId, JobReceipt, JobRequest, KeyValue, Split, WorkerId};
