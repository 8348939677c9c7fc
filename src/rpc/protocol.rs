//! Wire Protocol Definitions
//!
//! Every worker-to-worker call is one `WorkerRequest` posted to
//! [`ENDPOINT_RPC`] as bincode, answered by one `WorkerResponse`.
//! The client-side sink speaks JSON on its own two endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ClusterError;
use crate::job::{JobId, JobReceipt, JobRequest, KeyValue, Split, WorkerId};
use crate::membership::MemberInfo;

pub const ENDPOINT_RPC: &str = "/rpc";
pub const ENDPOINT_SINK_FETCH: &str = "/client/fetch";
pub const ENDPOINT_SINK_WRITE: &str = "/client/write";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JoinKind {
    /// The joiner asked this node to be its tracker.
    Direct,
    /// Relayed knowledge of a member monitored elsewhere.
    Propagated,
}

/// Who a member reports to, and who that tracker reports to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerLinks {
    pub master: Option<MemberInfo>,
    pub father: Option<MemberInfo>,
}

/// A fresh assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitContext {
    pub job_id: JobId,
    pub client_addr: String,
    pub map_name: String,
    pub splits: Vec<Split>,
    pub controller: WorkerId,
}

/// Work taken over from `from_worker`; the receiver reuses whatever it cached
/// as that worker's controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeContext {
    pub job_id: JobId,
    pub client_addr: String,
    pub map_name: String,
    pub splits: Vec<Split>,
    pub controller: WorkerId,
    pub from_worker: WorkerId,
}

/// Sent to a controller when its controlled worker starts work or finishes a split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitsUpdate {
    pub controlled: WorkerId,
    pub remaining: Vec<Split>,
    /// Input lines per split id, sent once after fetching.
    pub fetched: Option<BTreeMap<u32, Vec<String>>>,
}

/// Completion report for one engine run, forwarded up to the root.
///
/// Names the job and the splits the run wrote, so a tracker can tell a late
/// report from an old run apart from the work the member holds now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkReport {
    pub worker: WorkerId,
    pub job_id: JobId,
    pub splits: Vec<u32>,
}

/// Partially mapped output, keyed by absolute line number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputUpdate {
    pub controlled: WorkerId,
    pub lines: BTreeMap<u32, Vec<KeyValue>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    AskInput,
    ComputeMap,
    TransferOutput,
    Completed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStatus::Idle => "IDLE",
            WorkerStatus::AskInput => "ASK_INPUT",
            WorkerStatus::ComputeMap => "COMPUTE_MAP",
            WorkerStatus::TransferOutput => "TRANSFER_OUTPUT",
            WorkerStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub master: Option<WorkerId>,
    pub father: Option<WorkerId>,
    pub members: Vec<WorkerId>,
    pub pending_splits: usize,
    pub splits_done: u64,
    pub lines_mapped: u64,
    pub worker_frozen: bool,
    pub tracker_frozen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    Probe,
    Join { member: MemberInfo, kind: JoinKind },
    ReceiveMember { member: MemberInfo },
    ReceiveMemberList { members: Vec<MemberInfo> },
    SetTrackerLinks { links: TrackerLinks },
    Lifeproof { member: MemberInfo },
    WorkDone { report: WorkReport },
    MemberFailed { worker: WorkerId },
    SubmitJob { request: JobRequest },
    LoadSubmit { context: SubmitContext },
    LoadResume { context: ResumeContext },
    UpdateSubmit { update: SplitsUpdate },
    UpdateOutput { update: OutputUpdate },
    Slow { millis: u64 },
    FreezeWorker,
    UnfreezeWorker,
    FreezeTracker,
    UnfreezeTracker,
    Status,
    Die,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    Communication,
    Configuration,
    State,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    Ack,
    Probe { id: WorkerId },
    Father { father: Option<MemberInfo> },
    Receipt { receipt: JobReceipt },
    Status { report: StatusReport },
    Error { kind: ErrorKind, message: String },
}

impl WorkerResponse {
    pub fn from_error(err: &ClusterError) -> Self {
        let kind = match err {
            ClusterError::Communication { .. } => ErrorKind::Communication,
            ClusterError::Configuration(_) => ErrorKind::Configuration,
            ClusterError::State(_) | ClusterError::Io(_) => ErrorKind::State,
        };
        WorkerResponse::Error {
            kind,
            message: err.to_string(),
        }
    }

    /// Rebuilds the remote error on the calling side.
    pub fn into_error(kind: ErrorKind, message: String, peer: &str) -> ClusterError {
        match kind {
            ErrorKind::Communication => ClusterError::communication(peer, message),
            ErrorKind::Configuration => ClusterError::Configuration(message),
            ErrorKind::State => ClusterError::State(message),
        }
    }
}

/// Body of [`ENDPOINT_SINK_FETCH`].
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchLinesRequest {
    pub split: Split,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchLinesResponse {
    pub lines: Vec<String>,
}

/// Body of [`ENDPOINT_SINK_WRITE`].
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResultRequest {
    pub results: Vec<Vec<KeyValue>>,
    pub splits: Vec<Split>,
}
