use crate::job::{JobId, WorkerId};
use crate::rpc::WorkerStatus;

/// Notifications for whoever observes a node (a console, a test).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    StatusChanged {
        worker: WorkerId,
        status: WorkerStatus,
    },
    MemberJoined {
        worker: WorkerId,
    },
    MemberRemoved {
        worker: WorkerId,
    },
    AssignmentMoved {
        from: WorkerId,
        to: WorkerId,
        splits: Vec<u32>,
    },
    JobCompleted {
        job_id: JobId,
    },
}
