use std::collections::BTreeMap;
use std::sync::Arc;

use super::timer::LivenessTimer;
use super::types::{InsertOutcome, MemberInfo, MemberRecord};
use crate::error::{ClusterError, Result};
use crate::job::{Assignment, WorkerId};
use crate::rpc::WorkerRpc;

/// Per-node view of the pool, keyed and iterated in ascending id order.
///
/// The table is plain data; callers wrap it in a lock and must not hold that
/// lock across a remote call.
#[derive(Default)]
pub struct MembershipTable {
    members: BTreeMap<WorkerId, MemberRecord>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member, or completes an existing record.
    ///
    /// An existing record keeps its handle and assignment. It only takes
    /// `timer` when it had none; otherwise the supplied timer is dropped.
    pub fn insert(
        &mut self,
        info: MemberInfo,
        handle: Arc<dyn WorkerRpc>,
        timer: Option<LivenessTimer>,
    ) -> InsertOutcome {
        match self.members.get_mut(&info.id) {
            Some(record) => {
                if record.timer.is_none() && timer.is_some() {
                    record.timer = timer;
                    InsertOutcome::TimerFilled
                } else {
                    InsertOutcome::Unchanged
                }
            }
            None => {
                let mut record = MemberRecord::new(info.clone(), handle);
                record.timer = timer;
                self.members.insert(info.id, record);
                InsertOutcome::Inserted
            }
        }
    }

    /// Removes a member, stopping its timer.
    pub fn remove(&mut self, id: WorkerId) -> Result<MemberRecord> {
        self.members
            .remove(&id)
            .ok_or_else(|| ClusterError::State(format!("{} is not a member", id)))
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: WorkerId) -> Option<&MemberRecord> {
        self.members.get(&id)
    }

    pub fn handle(&self, id: WorkerId) -> Option<Arc<dyn WorkerRpc>> {
        self.members.get(&id).map(|r| r.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.members.keys().copied().collect()
    }

    pub fn infos(&self) -> Vec<MemberInfo> {
        self.members.values().map(|r| r.info.clone()).collect()
    }

    pub fn has_timer(&self, id: WorkerId) -> bool {
        self.members.get(&id).is_some_and(|r| r.timer.is_some())
    }

    /// Restarts the member's liveness window. Returns `false` when the member
    /// is unknown or not monitored here.
    pub fn reset_timer(&self, id: WorkerId) -> bool {
        match self.members.get(&id).and_then(|r| r.timer.as_ref()) {
            Some(timer) => {
                timer.reset();
                true
            }
            None => false,
        }
    }

    pub fn assignment(&self, id: WorkerId) -> Option<&Assignment> {
        self.members.get(&id).and_then(|r| r.assignment.as_ref())
    }

    pub fn set_assignment(&mut self, assignment: Assignment) -> Result<()> {
        let owner = assignment.owner;
        match self.members.get_mut(&owner) {
            Some(record) => {
                record.assignment = Some(assignment);
                Ok(())
            }
            None => Err(ClusterError::State(format!(
                "cannot assign work to unknown member {}",
                owner
            ))),
        }
    }

    /// Empties the member's slot, returning what it held.
    pub fn take_assignment(&mut self, id: WorkerId) -> Option<Assignment> {
        self.members.get_mut(&id).and_then(|r| r.assignment.take())
    }

    /// Empties the member's slot if it holds every split in `finished`.
    ///
    /// A resumed run may cover fewer splits than were recorded (the rest were
    /// written before the hand-off), so a subset matches. Anything else is a
    /// report about work the member no longer holds and leaves the slot alone.
    pub fn finish_assignment(&mut self, id: WorkerId, finished: &[u32]) -> Option<Assignment> {
        let record = self.members.get_mut(&id)?;
        let held = record.assignment.as_ref()?;
        if finished.is_empty() || !finished.iter().all(|split| held.contains(*split)) {
            return None;
        }
        record.assignment.take()
    }

    /// Hands orphaned work to an idle member in one step.
    ///
    /// `preferred` wins when it is known and idle; otherwise the lowest idle id
    /// takes it. Returns the re-owned assignment, or `None` when every member
    /// is busy (the orphan is left untouched for the caller to retry).
    pub fn place_orphan(&mut self, orphan: &Assignment, preferred: WorkerId) -> Option<Assignment> {
        let target = if self.members.get(&preferred).is_some_and(|r| r.is_idle()) {
            Some(preferred)
        } else {
            self.members
                .values()
                .find(|r| r.is_idle())
                .map(|r| r.id())
        }?;

        let placed = orphan.clone().handed_to(target);
        if let Some(record) = self.members.get_mut(&target) {
            record.assignment = Some(placed.clone());
        }
        Some(placed)
    }

    /// Members still holding work, in id order.
    pub fn busy_members(&self) -> Vec<WorkerId> {
        self.members
            .values()
            .filter(|r| !r.is_idle())
            .map(|r| r.id())
            .collect()
    }

    pub fn has_outstanding_work(&self) -> bool {
        self.members.values().any(|r| !r.is_idle())
    }

    /// Members whose slot contains `split_id`.
    pub fn owners_of(&self, split_id: u32) -> Vec<WorkerId> {
        self.members
            .values()
            .filter(|r| r.assignment.as_ref().is_some_and(|a| a.contains(split_id)))
            .map(|r| r.id())
            .collect()
    }

    /// Stops every liveness timer; the records stay.
    pub fn stop_timers(&mut self) {
        for record in self.members.values_mut() {
            record.timer = None;
        }
    }

    pub fn clear_assignments(&mut self) {
        for record in self.members.values_mut() {
            record.assignment = None;
        }
    }
}
