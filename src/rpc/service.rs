use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{
    JoinKind, OutputUpdate, ResumeContext, SplitsUpdate, StatusReport, SubmitContext, TrackerLinks,
    WorkReport,
};
use crate::error::Result;
use crate::job::{JobReceipt, JobRequest, WorkerId};
use crate::membership::MemberInfo;
use crate::sink::DataSink;

/// Every operation one worker can invoke on another.
///
/// Implementations never hide a remote failure: an unreachable, timed out or
/// undecodable peer surfaces as `ClusterError::Communication`.
#[async_trait]
pub trait WorkerRpc: Send + Sync {
    /// Directory address this handle points at.
    fn addr(&self) -> &str;

    async fn probe(&self) -> Result<WorkerId>;

    async fn join(&self, member: MemberInfo, kind: JoinKind) -> Result<()>;

    /// Broadcast from a tracker about a member it just admitted.
    async fn receive_member(&self, member: MemberInfo) -> Result<()>;

    /// Snapshot of the tracker's table, sent to a fresh joiner.
    async fn receive_member_list(&self, members: Vec<MemberInfo>) -> Result<()>;

    async fn set_tracker_links(&self, links: TrackerLinks) -> Result<()>;

    /// Liveness ping. The reply is the tracker's own master tracker, which
    /// the sender caches as its father.
    async fn lifeproof(&self, member: MemberInfo) -> Result<Option<MemberInfo>>;

    async fn work_done(&self, report: WorkReport) -> Result<()>;

    /// Failure report from below. A receiver that monitors `worker` itself
    /// confirms with a probe before acting.
    async fn member_failed(&self, worker: WorkerId) -> Result<()>;

    async fn submit_job(&self, request: JobRequest) -> Result<JobReceipt>;

    async fn load_submit(&self, context: SubmitContext) -> Result<()>;

    async fn load_resume(&self, context: ResumeContext) -> Result<()>;

    async fn update_submit(&self, update: SplitsUpdate) -> Result<()>;

    async fn update_output(&self, update: OutputUpdate) -> Result<()>;

    async fn slow(&self, duration: Duration) -> Result<()>;

    async fn freeze_worker(&self) -> Result<()>;

    async fn unfreeze_worker(&self) -> Result<()>;

    async fn freeze_tracker(&self) -> Result<()>;

    async fn unfreeze_tracker(&self) -> Result<()>;

    async fn status(&self) -> Result<StatusReport>;

    async fn die(&self) -> Result<()>;
}

/// Turns opaque directory addresses into handles.
pub trait Directory: Send + Sync {
    fn worker(&self, addr: &str) -> Arc<dyn WorkerRpc>;

    fn sink(&self, addr: &str) -> Result<Arc<dyn DataSink>>;
}
