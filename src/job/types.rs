use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Identity of a worker in the pool.
///
/// Ids are small positive integers handed out by whoever launches the
/// process; the controller ring in [`super::assigner::controller_for`] assumes
/// they run `1..=n`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// An inclusive range of input lines, the unit of assignable work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Split {
    pub id: u32,
    pub from: u32,
    pub to: u32,
}

impl Split {
    pub fn new(id: u32, from: u32, to: u32) -> Self {
        Self { id, from, to }
    }

    pub fn lines(&self) -> RangeInclusive<u32> {
        self.from..=self.to
    }

    pub fn line_count(&self) -> usize {
        (self.to - self.from + 1) as usize
    }
}

/// One `(key, value)` pair emitted by a map function.
pub type KeyValue = (String, String);

/// The outstanding work currently owned by exactly one member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub owner: WorkerId,
    pub splits: Vec<Split>,
}

impl Assignment {
    pub fn new(owner: WorkerId, splits: Vec<Split>) -> Self {
        Self { owner, splits }
    }

    pub fn contains(&self, split_id: u32) -> bool {
        self.splits.iter().any(|s| s.id == split_id)
    }

    /// Re-points the owner field; used when the work changes hands.
    pub fn handed_to(mut self, owner: WorkerId) -> Self {
        self.owner = owner;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// What an external submitter hands to the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Number of lines in the input.
    pub file_size: u32,
    /// Requested number of splits.
    pub n_splits: u32,
    /// Directory address of the client-side sink serving input and taking results.
    pub client_addr: String,
    /// Registered name of the map function.
    pub map_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: JobId,
    pub splits: usize,
    pub assigned_members: usize,
}
