//! HTTP Transport
//!
//! Workers talk to each other with one bincode-encoded request per POST to
//! `/rpc`. Transport failures, non-success statuses and undecodable bodies
//! all map to `ClusterError::Communication`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::*;
use super::service::{Directory, WorkerRpc};
use crate::config::DEFAULT_RPC_TIMEOUT;
use crate::error::{ClusterError, Result};
use crate::job::{JobReceipt, JobRequest, WorkerId};
use crate::membership::MemberInfo;
use crate::sink::{DataSink, HttpSinkClient};

const DEFAULT_ATTEMPTS: usize = 2;

/// Sends the request built by `build`, retrying connection failures with a
/// jittered exponential backoff.
pub(crate) async fn send_with_retry<F>(
    build: F,
    attempts: usize,
) -> std::result::Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut delay_ms = 150u64;
    let mut attempt = 0;

    loop {
        match build().send().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(e);
                }
                // Simple jitter to prevent thundering herd
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }
}

pub struct HttpWorkerClient {
    addr: String,
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl HttpWorkerClient {
    pub fn new(addr: impl Into<String>, http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            http_client,
            timeout,
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    async fn call(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        let body = bincode::serialize(&request)
            .map_err(|e| ClusterError::communication(&self.addr, e))?;
        let url = format!("{}{}", self.addr.trim_end_matches('/'), ENDPOINT_RPC);

        let resp = send_with_retry(
            || {
                self.http_client
                    .post(url.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(body.clone())
                    .timeout(self.timeout)
            },
            self.attempts,
        )
        .await
        .map_err(|e| ClusterError::communication(&self.addr, e))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClusterError::communication(&self.addr, e))?;

        let response: WorkerResponse = bincode::deserialize(&bytes).map_err(|e| {
            ClusterError::communication(&self.addr, format!("{} (HTTP {})", e, status))
        })?;

        match response {
            WorkerResponse::Error { kind, message } => {
                Err(WorkerResponse::into_error(kind, message, &self.addr))
            }
            other => Ok(other),
        }
    }

    async fn call_ack(&self, request: WorkerRequest) -> Result<()> {
        match self.call(request).await? {
            WorkerResponse::Ack => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    fn unexpected(&self, response: WorkerResponse) -> ClusterError {
        ClusterError::communication(&self.addr, format!("unexpected reply {:?}", response))
    }
}

#[async_trait]
impl WorkerRpc for HttpWorkerClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn probe(&self) -> Result<WorkerId> {
        match self.call(WorkerRequest::Probe).await? {
            WorkerResponse::Probe { id } => Ok(id),
            other => Err(self.unexpected(other)),
        }
    }

    async fn join(&self, member: MemberInfo, kind: JoinKind) -> Result<()> {
        self.call_ack(WorkerRequest::Join { member, kind }).await
    }

    async fn receive_member(&self, member: MemberInfo) -> Result<()> {
        self.call_ack(WorkerRequest::ReceiveMember { member }).await
    }

    async fn receive_member_list(&self, members: Vec<MemberInfo>) -> Result<()> {
        self.call_ack(WorkerRequest::ReceiveMemberList { members })
            .await
    }

    async fn set_tracker_links(&self, links: TrackerLinks) -> Result<()> {
        self.call_ack(WorkerRequest::SetTrackerLinks { links }).await
    }

    async fn lifeproof(&self, member: MemberInfo) -> Result<Option<MemberInfo>> {
        match self.call(WorkerRequest::Lifeproof { member }).await? {
            WorkerResponse::Father { father } => Ok(father),
            other => Err(self.unexpected(other)),
        }
    }

    async fn work_done(&self, report: WorkReport) -> Result<()> {
        self.call_ack(WorkerRequest::WorkDone { report }).await
    }

    async fn member_failed(&self, worker: WorkerId) -> Result<()> {
        self.call_ack(WorkerRequest::MemberFailed { worker }).await
    }

    async fn submit_job(&self, request: JobRequest) -> Result<JobReceipt> {
        match self.call(WorkerRequest::SubmitJob { request }).await? {
            WorkerResponse::Receipt { receipt } => Ok(receipt),
            other => Err(self.unexpected(other)),
        }
    }

    async fn load_submit(&self, context: SubmitContext) -> Result<()> {
        self.call_ack(WorkerRequest::LoadSubmit { context }).await
    }

    async fn load_resume(&self, context: ResumeContext) -> Result<()> {
        self.call_ack(WorkerRequest::LoadResume { context }).await
    }

    async fn update_submit(&self, update: SplitsUpdate) -> Result<()> {
        self.call_ack(WorkerRequest::UpdateSubmit { update }).await
    }

    async fn update_output(&self, update: OutputUpdate) -> Result<()> {
        self.call_ack(WorkerRequest::UpdateOutput { update }).await
    }

    async fn slow(&self, duration: Duration) -> Result<()> {
        let millis = duration.as_millis() as u64;
        self.call_ack(WorkerRequest::Slow { millis }).await
    }

    async fn freeze_worker(&self) -> Result<()> {
        self.call_ack(WorkerRequest::FreezeWorker).await
    }

    async fn unfreeze_worker(&self) -> Result<()> {
        self.call_ack(WorkerRequest::UnfreezeWorker).await
    }

    async fn freeze_tracker(&self) -> Result<()> {
        self.call_ack(WorkerRequest::FreezeTracker).await
    }

    async fn unfreeze_tracker(&self) -> Result<()> {
        self.call_ack(WorkerRequest::UnfreezeTracker).await
    }

    async fn status(&self) -> Result<StatusReport> {
        match self.call(WorkerRequest::Status).await? {
            WorkerResponse::Status { report } => Ok(report),
            other => Err(self.unexpected(other)),
        }
    }

    async fn die(&self) -> Result<()> {
        self.call_ack(WorkerRequest::Die).await
    }
}

/// Addresses are base URLs such as `http://127.0.0.1:3001`.
pub struct HttpDirectory {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            http_client: reqwest::Client::new(),
            timeout,
        })
    }
}

impl Default for HttpDirectory {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl Directory for HttpDirectory {
    fn worker(&self, addr: &str) -> Arc<dyn WorkerRpc> {
        Arc::new(HttpWorkerClient::new(
            addr,
            self.http_client.clone(),
            self.timeout,
        ))
    }

    fn sink(&self, addr: &str) -> Result<Arc<dyn DataSink>> {
        Ok(Arc::new(HttpSinkClient::new(
            addr,
            self.http_client.clone(),
            self.timeout,
        )))
    }
}
