use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::timer::LivenessTimer;
use crate::job::{Assignment, WorkerId};
use crate::rpc::WorkerRpc;

/// What a member looks like on the wire: its id and directory address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    pub id: WorkerId,
    pub addr: String,
}

impl MemberInfo {
    pub fn new(id: WorkerId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

impl fmt::Display for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// One known peer (self included) as seen from a single node.
///
/// `timer` is present only for members this node monitors directly.
/// `assignment` is the work this node believes the member owns.
pub struct MemberRecord {
    pub info: MemberInfo,
    pub handle: Arc<dyn WorkerRpc>,
    pub timer: Option<LivenessTimer>,
    pub assignment: Option<Assignment>,
}

impl MemberRecord {
    pub fn new(info: MemberInfo, handle: Arc<dyn WorkerRpc>) -> Self {
        Self {
            info,
            handle,
            timer: None,
            assignment: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.info.id
    }

    pub fn is_idle(&self) -> bool {
        self.assignment.is_none()
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The member was known but unmonitored; the supplied timer was kept.
    TimerFilled,
    Unchanged,
}
