//! In-Process Transport
//!
//! Runs a whole pool inside one process: every handle is a weak pointer to
//! the target node. A dropped or dead node fails calls exactly like an
//! unreachable host, and every call is bounded by the same timeout the HTTP
//! client uses.

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::protocol::*;
use super::service::{Directory, WorkerRpc};
use crate::error::{ClusterError, Result};
use crate::job::{JobReceipt, JobRequest, WorkerId};
use crate::membership::MemberInfo;
use crate::sink::DataSink;
use crate::worker::WorkerNode;

pub struct LocalPeer {
    addr: String,
    node: Weak<WorkerNode>,
    timeout: Duration,
}

impl LocalPeer {
    pub fn new(addr: impl Into<String>, node: Weak<WorkerNode>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            node,
            timeout,
        }
    }

    /// A handle that points nowhere; every call fails.
    pub fn detached(addr: impl Into<String>) -> Self {
        Self::new(addr, Weak::new(), Duration::from_secs(1))
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<WorkerNode>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let node = self
            .node
            .upgrade()
            .filter(|node| !node.is_dead())
            .ok_or_else(|| ClusterError::communication(&self.addr, "node is down"))?;

        match tokio::time::timeout(self.timeout, op(node)).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::communication(
                &self.addr,
                format!("no reply within {:?}", self.timeout),
            )),
        }
    }
}

#[async_trait]
impl WorkerRpc for LocalPeer {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn probe(&self) -> Result<WorkerId> {
        self.call(|node| async move { Ok(node.id()) }).await
    }

    async fn join(&self, member: MemberInfo, kind: JoinKind) -> Result<()> {
        self.call(|node| async move { node.handle_join(member, kind).await })
            .await
    }

    async fn receive_member(&self, member: MemberInfo) -> Result<()> {
        self.call(|node| async move { node.handle_receive_member(member).await })
            .await
    }

    async fn receive_member_list(&self, members: Vec<MemberInfo>) -> Result<()> {
        self.call(|node| async move { node.handle_receive_member_list(members).await })
            .await
    }

    async fn set_tracker_links(&self, links: TrackerLinks) -> Result<()> {
        self.call(|node| async move { node.handle_set_tracker_links(links).await })
            .await
    }

    async fn lifeproof(&self, member: MemberInfo) -> Result<Option<MemberInfo>> {
        self.call(|node| async move { node.handle_lifeproof(member).await })
            .await
    }

    async fn work_done(&self, report: WorkReport) -> Result<()> {
        self.call(|node| async move { node.handle_work_done(report).await })
            .await
    }

    async fn member_failed(&self, worker: WorkerId) -> Result<()> {
        self.call(|node| async move {
            node.spawn_failure_report(worker);
            Ok(())
        })
        .await
    }

    async fn submit_job(&self, request: JobRequest) -> Result<JobReceipt> {
        self.call(|node| async move { node.handle_submit_job(request).await })
            .await
    }

    async fn load_submit(&self, context: SubmitContext) -> Result<()> {
        self.call(|node| async move { node.handle_load_submit(context).await })
            .await
    }

    async fn load_resume(&self, context: ResumeContext) -> Result<()> {
        self.call(|node| async move { node.handle_load_resume(context).await })
            .await
    }

    async fn update_submit(&self, update: SplitsUpdate) -> Result<()> {
        self.call(|node| async move { node.handle_update_submit(update).await })
            .await
    }

    async fn update_output(&self, update: OutputUpdate) -> Result<()> {
        self.call(|node| async move { node.handle_update_output(update).await })
            .await
    }

    async fn slow(&self, duration: Duration) -> Result<()> {
        self.call(|node| async move { node.slow(duration).await })
            .await
    }

    async fn freeze_worker(&self) -> Result<()> {
        self.call(|node| async move { node.freeze_worker() }).await
    }

    async fn unfreeze_worker(&self) -> Result<()> {
        self.call(|node| async move { node.unfreeze_worker() }).await
    }

    async fn freeze_tracker(&self) -> Result<()> {
        self.call(|node| async move { node.freeze_tracker() }).await
    }

    async fn unfreeze_tracker(&self) -> Result<()> {
        self.call(|node| async move { node.unfreeze_tracker() }).await
    }

    async fn status(&self) -> Result<StatusReport> {
        self.call(|node| async move { Ok(node.status_report().await) })
            .await
    }

    async fn die(&self) -> Result<()> {
        self.call(|node| async move {
            node.die().await;
            Ok(())
        })
        .await
    }
}

/// Address book for a single-process pool.
pub struct LocalDirectory {
    nodes: DashMap<String, Weak<WorkerNode>>,
    sinks: DashMap<String, Arc<dyn DataSink>>,
    timeout: Duration,
}

impl LocalDirectory {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
            sinks: DashMap::new(),
            timeout,
        })
    }

    pub fn register_node(&self, node: &Arc<WorkerNode>) {
        self.nodes
            .insert(node.info().addr.clone(), Arc::downgrade(node));
    }

    pub fn register_sink(&self, sink: Arc<dyn DataSink>) {
        self.sinks.insert(sink.addr().to_string(), sink);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Directory for LocalDirectory {
    fn worker(&self, addr: &str) -> Arc<dyn WorkerRpc> {
        let node = self
            .nodes
            .get(addr)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Arc::new(LocalPeer::new(addr, node, self.timeout))
    }

    fn sink(&self, addr: &str) -> Result<Arc<dyn DataSink>> {
        self.sinks
            .get(addr)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::communication(addr, "no sink registered at this address"))
    }
}
