//! In-process pool used by the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use peer_mapper::job::{JobId, JobRequest, WorkerId};
use peer_mapper::mapper::MapRegistry;
use peer_mapper::rpc::LocalDirectory;
use peer_mapper::sink::MemorySink;
use peer_mapper::{NodeConfig, NodeEvent, WorkerNode, telemetry};
use tokio::sync::broadcast;

pub const SINK: &str = "local://client";

pub struct Pool {
    pub directory: Arc<LocalDirectory>,
    pub sink: Arc<MemorySink>,
    pub nodes: Vec<Arc<WorkerNode>>,
}

impl Pool {
    pub fn new(lines: usize) -> Self {
        telemetry::init_for_tests();
        let directory = LocalDirectory::new(Duration::from_millis(500));
        let input = (0..lines)
            .map(|i| format!("line {} of the quick brown fox", i))
            .collect();
        let sink = MemorySink::new(SINK, input);
        directory.register_sink(sink.clone());
        Self {
            directory,
            sink,
            nodes: Vec::new(),
        }
    }

    pub fn config(id: u32) -> NodeConfig {
        NodeConfig::new(WorkerId(id), addr(id))
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_liveness_timeout(Duration::from_millis(300))
            .with_straggler_delay(Duration::from_millis(200))
            .with_reassign_backoff(Duration::from_millis(50))
            .with_flush_interval(Duration::from_millis(1))
            .with_rpc_timeout(Duration::from_millis(500))
    }

    pub async fn spawn(&mut self, id: u32, entry: Option<u32>) -> Arc<WorkerNode> {
        self.spawn_with(Self::config(id), entry).await
    }

    pub async fn spawn_with(&mut self, config: NodeConfig, entry: Option<u32>) -> Arc<WorkerNode> {
        self.spawn_with_registry(config, MapRegistry::with_builtins(), entry)
            .await
    }

    pub async fn spawn_with_registry(
        &mut self,
        config: NodeConfig,
        registry: Arc<MapRegistry>,
        entry: Option<u32>,
    ) -> Arc<WorkerNode> {
        let node = WorkerNode::new(config, self.directory.clone(), registry);
        self.directory.register_node(&node);
        node.start();
        if let Some(entry) = entry {
            node.join_pool(&addr(entry))
                .await
                .expect("join through entry");
        }
        self.nodes.push(node.clone());
        node
    }

    /// Root `W1` plus `W2..=Wn`, all joining through the root.
    pub async fn star(lines: usize, n: u32) -> Self {
        let mut pool = Self::new(lines);
        pool.spawn(1, None).await;
        for id in 2..=n {
            pool.spawn(id, Some(1)).await;
        }
        pool
    }

    pub fn node(&self, id: u32) -> Arc<WorkerNode> {
        self.nodes
            .iter()
            .find(|n| n.id() == WorkerId(id))
            .cloned()
            .expect("node exists")
    }

    pub fn root(&self) -> Arc<WorkerNode> {
        self.node(1)
    }

    pub async fn sorted_writes(&self) -> Vec<u32> {
        let mut written = self.sink.written_splits().await;
        written.sort();
        written
    }
}

pub fn addr(id: u32) -> String {
    format!("local://W{}", id)
}

pub fn request(file_size: u32, n_splits: u32) -> JobRequest {
    JobRequest {
        file_size,
        n_splits,
        client_addr: SINK.to_string(),
        map_name: "word_count".to_string(),
    }
}

pub async fn eventually<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_for_completion(events: &mut broadcast::Receiver<NodeEvent>) -> JobId {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(NodeEvent::JobCompleted { job_id }) => return job_id,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("job completes")
}
