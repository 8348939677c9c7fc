use std::collections::BTreeMap;

use crate::job::{JobId, KeyValue, Split, WorkerId};
use crate::mapper::MapFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Idle,
    Submit,
    Exit,
}

/// What the execution engine should do next. Overwritten in place by every
/// submit or resume; the engine abandons a run whose generation is stale.
pub struct ExecutionContext {
    pub operation: Operation,
    pub generation: u64,
    pub job_id: Option<JobId>,
    pub client_addr: String,
    pub map_fn: Option<MapFn>,
    pub pending: Vec<Split>,
    pub controller: Option<WorkerId>,
    /// Input already in hand, per split id.
    pub fetched: BTreeMap<u32, Vec<String>>,
    /// Lines someone already mapped, per absolute line number.
    pub mapped: BTreeMap<u32, Vec<KeyValue>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            operation: Operation::Idle,
            generation: 0,
            job_id: None,
            client_addr: String::new(),
            map_fn: None,
            pending: Vec::new(),
            controller: None,
            fetched: BTreeMap::new(),
            mapped: BTreeMap::new(),
        }
    }

    /// Hands the loaded work to the engine, leaving the context idle.
    pub fn take_run(&mut self) -> Option<Run> {
        if self.operation != Operation::Submit {
            return None;
        }
        self.operation = Operation::Idle;
        let map_fn = self.map_fn.clone()?;
        Some(Run {
            generation: self.generation,
            job_id: self.job_id.clone().unwrap_or_default(),
            client_addr: self.client_addr.clone(),
            map_fn,
            splits: self.pending.clone(),
            controller: self.controller,
            fetched: std::mem::take(&mut self.fetched),
            mapped: std::mem::take(&mut self.mapped),
        })
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One engine pass over a loaded context.
pub struct Run {
    pub generation: u64,
    pub job_id: JobId,
    pub client_addr: String,
    pub map_fn: MapFn,
    pub splits: Vec<Split>,
    pub controller: Option<WorkerId>,
    pub fetched: BTreeMap<u32, Vec<String>>,
    pub mapped: BTreeMap<u32, Vec<KeyValue>>,
}

/// Job metadata kept by the node that dealt the work.
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: JobId,
    pub client_addr: String,
    pub map_name: String,
}

/// What a controller knows about one controlled worker's current work.
#[derive(Debug, Clone, Default)]
pub struct ControlledWork {
    pub remaining: Vec<Split>,
    pub fetched: BTreeMap<u32, Vec<String>>,
    pub outputs: BTreeMap<u32, Vec<KeyValue>>,
}

impl ControlledWork {
    /// Drops inputs and outputs of splits that are no longer pending.
    pub fn prune(&mut self) {
        let remaining = &self.remaining;
        self.fetched
            .retain(|split_id, _| remaining.iter().any(|s| s.id == *split_id));
        self.outputs
            .retain(|line, _| remaining.iter().any(|s| s.lines().contains(line)));
    }
}
