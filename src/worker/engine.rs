//! Execution engine: `Idle -> AskInput -> ComputeMap/TransferOutput -> Completed -> Idle`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::Instant;

use super::context::{Operation, Run};
use super::node::WorkerNode;
use crate::error::{ClusterError, Result};
use crate::job::{KeyValue, Split, WorkerId};
use crate::rpc::{
    OutputUpdate, ResumeContext, SplitsUpdate, SubmitContext, WorkReport, WorkerRpc, WorkerStatus,
};

impl WorkerNode {
    pub(crate) async fn run_engine(self: Arc<Self>) {
        tracing::debug!(worker_id = %self.id(), "Engine started");

        loop {
            let run = {
                let mut ctx = self.context.lock().await;
                if ctx.operation == Operation::Exit {
                    break;
                }
                ctx.take_run()
            };

            match run {
                Some(run) => self.process_run(run).await,
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.id(), "Engine stopped");
    }

    /// Loads a fresh assignment, replacing whatever the engine was doing.
    pub async fn handle_load_submit(&self, submit: SubmitContext) -> Result<()> {
        let map_fn = self.registry.resolve(&submit.map_name)?;

        tracing::info!(
            worker_id = %self.id(),
            "Loaded submit for job {}: {} splits, controller {}",
            submit.job_id.0,
            submit.splits.len(),
            submit.controller
        );

        {
            let mut ctx = self.context.lock().await;
            if ctx.operation == Operation::Exit {
                return Err(ClusterError::State("worker is exiting".to_string()));
            }
            ctx.operation = Operation::Submit;
            ctx.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.job_id = Some(submit.job_id);
            ctx.client_addr = submit.client_addr;
            ctx.map_fn = Some(map_fn);
            ctx.pending = submit.splits;
            ctx.controller = Some(submit.controller);
            ctx.fetched = BTreeMap::new();
            ctx.mapped = BTreeMap::new();
        }
        self.splits_done.store(0, Ordering::Relaxed);
        self.wake.notify_one();
        Ok(())
    }

    /// Loads work taken over from `from_worker`.
    ///
    /// If this node controlled `from_worker`, its cached view narrows the
    /// splits to those still pending and supplies the fetched input and any
    /// lines already mapped.
    pub async fn handle_load_resume(&self, resume: ResumeContext) -> Result<()> {
        let map_fn = self.registry.resolve(&resume.map_name)?;
        let cached = self.controlled.lock().await.remove(&resume.from_worker);

        let (splits, fetched, mapped) = match cached {
            Some(work) => {
                let narrowed: Vec<Split> = resume
                    .splits
                    .iter()
                    .filter(|s| work.remaining.iter().any(|r| r.id == s.id))
                    .copied()
                    .collect();
                let splits = if narrowed.is_empty() {
                    resume.splits
                } else {
                    narrowed
                };
                tracing::info!(
                    worker_id = %self.id(),
                    "Resuming {} from controller cache: {} splits, {} fetched, {} lines mapped",
                    resume.from_worker,
                    splits.len(),
                    work.fetched.len(),
                    work.outputs.len()
                );
                (splits, work.fetched, work.outputs)
            }
            None => {
                tracing::info!(
                    worker_id = %self.id(),
                    "Resuming {} without cache: {} splits",
                    resume.from_worker,
                    resume.splits.len()
                );
                (resume.splits, BTreeMap::new(), BTreeMap::new())
            }
        };

        {
            let mut ctx = self.context.lock().await;
            if ctx.operation == Operation::Exit {
                return Err(ClusterError::State("worker is exiting".to_string()));
            }
            ctx.operation = Operation::Submit;
            ctx.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.job_id = Some(resume.job_id);
            ctx.client_addr = resume.client_addr;
            ctx.map_fn = Some(map_fn);
            ctx.pending = splits;
            ctx.controller = Some(resume.controller);
            ctx.fetched = fetched;
            ctx.mapped = mapped;
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Yield point between lines and splits.
    ///
    /// Parks while frozen or slowed. Returns `false` when the run must be
    /// abandoned: the node is dying or a newer context replaced this one.
    async fn checkpoint(&self, generation: u64) -> bool {
        tokio::task::yield_now().await;

        if self.worker_gate.is_paused() {
            tokio::select! {
                _ = self.worker_gate.wait_open() => {}
                _ = self.shutdown.cancelled() => return false,
            }
        }

        let slow_until = *self.slow_until.lock().await;
        if let Some(until) = slow_until
            && until > Instant::now()
        {
            tokio::select! {
                _ = tokio::time::sleep_until(until) => {}
                _ = self.shutdown.cancelled() => return false,
            }
        }

        !self.shutdown.is_cancelled() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn process_run(self: &Arc<Self>, run: Run) {
        let Run {
            generation,
            job_id,
            client_addr,
            map_fn,
            splits,
            controller,
            mut fetched,
            mapped,
        } = run;

        tracing::info!(
            worker_id = %self.id(),
            "Processing {} splits of job {}",
            splits.len(),
            job_id.0
        );

        let sink = match self.directory.sink(&client_addr) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::warn!(worker_id = %self.id(), "Client sink unavailable: {}", e);
                None
            }
        };
        let controller = self.controller_handle(controller).await;

        // AskInput
        self.set_status(WorkerStatus::AskInput);
        let resumed = !fetched.is_empty();
        for split in &splits {
            if fetched.contains_key(&split.id) {
                continue;
            }
            if !self.checkpoint(generation).await {
                return self.abandon(generation);
            }
            let lines = match &sink {
                Some(sink) => match sink.fetch_lines(*split).await {
                    Ok(lines) => lines,
                    Err(e) => {
                        tracing::warn!(worker_id = %self.id(), split_id = split.id, "Fetch failed: {}", e);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            fetched.insert(split.id, lines);
        }

        if let Some(ctrl) = &controller {
            let update = SplitsUpdate {
                controlled: self.id(),
                remaining: splits.clone(),
                fetched: Some(fetched.clone()),
            };
            absorb(ctrl.1.update_submit(update).await, self.id(), "update controller");
        }
        if resumed {
            tracing::debug!(worker_id = %self.id(), "Input reused from controller cache");
        }

        // ComputeMap / TransferOutput, split by split
        let mut remaining = splits.clone();
        for split in &splits {
            self.set_status(WorkerStatus::ComputeMap);
            let lines = fetched.remove(&split.id).unwrap_or_default();
            let mut result: Vec<KeyValue> = Vec::new();
            let mut unsent: BTreeMap<u32, Vec<KeyValue>> = BTreeMap::new();
            let mut last_flush = Instant::now();

            for (line_no, line) in split.lines().zip(lines.iter()) {
                if !self.checkpoint(generation).await {
                    return self.abandon(generation);
                }

                let pairs = match mapped.get(&line_no) {
                    Some(cached) => cached.clone(),
                    None => map_fn(line.as_str()),
                };
                result.extend(pairs.iter().cloned());
                unsent.insert(line_no, pairs);
                self.lines_mapped.fetch_add(1, Ordering::Relaxed);

                if last_flush.elapsed() >= self.config.flush_interval {
                    if let Some(ctrl) = &controller {
                        let update = OutputUpdate {
                            controlled: self.id(),
                            lines: std::mem::take(&mut unsent),
                        };
                        absorb(ctrl.1.update_output(update).await, self.id(), "flush partial output");
                    }
                    last_flush = Instant::now();
                }
            }

            self.set_status(WorkerStatus::TransferOutput);
            if let Some(sink) = &sink
                && let Err(e) = sink.write_result(vec![result], vec![*split]).await
            {
                tracing::warn!(worker_id = %self.id(), split_id = split.id, "Write failed: {}", e);
            }

            self.splits_done.fetch_add(1, Ordering::Relaxed);
            remaining.retain(|s| s.id != split.id);
            {
                let mut ctx = self.context.lock().await;
                if self.generation.load(Ordering::SeqCst) == generation {
                    ctx.pending.retain(|s| s.id != split.id);
                }
            }
            tracing::debug!(worker_id = %self.id(), split_id = split.id, "Split finished");

            if let Some(ctrl) = &controller {
                let update = SplitsUpdate {
                    controlled: self.id(),
                    remaining: remaining.clone(),
                    fetched: None,
                };
                absorb(ctrl.1.update_submit(update).await, self.id(), "update controller");
            }
        }

        self.set_status(WorkerStatus::Completed);
        tracing::info!(worker_id = %self.id(), "Finished job {}", job_id.0);
        let report = WorkReport {
            worker: self.id(),
            job_id,
            splits: splits.iter().map(|s| s.id).collect(),
        };
        self.report_work_done(report).await;
        self.set_status(WorkerStatus::Idle);
    }

    fn abandon(&self, generation: u64) {
        tracing::info!(worker_id = %self.id(), "Run {} abandoned", generation);
        if !self.is_dead() {
            self.set_status(WorkerStatus::Idle);
        }
    }

    /// Handle for the controller, or `None` when this node controls itself.
    async fn controller_handle(&self, controller: Option<WorkerId>) -> Option<(WorkerId, Arc<dyn WorkerRpc>)> {
        let id = controller.filter(|c| *c != self.id())?;
        match self.table.lock().await.handle(id) {
            Some(handle) => Some((id, handle)),
            None => {
                tracing::debug!(worker_id = %self.id(), "Controller {} is not a known member", id);
                None
            }
        }
    }

    /// Reports completion to the master tracker, falling back to its father
    /// and finally to this node itself.
    async fn report_work_done(self: &Arc<Self>, report: WorkReport) {
        loop {
            let Some(master) = self.master().await else {
                let node = self.clone();
                let id = self.id();
                tokio::spawn(async move {
                    if let Err(e) = node.handle_work_done(report).await {
                        tracing::debug!(worker_id = %id, "Local work-done failed: {}", e);
                    }
                });
                return;
            };

            let handle = self.handle_for(&master).await;
            match handle.work_done(report.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        worker_id = %self.id(),
                        peer = %master.id,
                        "Master tracker unreachable while reporting work done: {}",
                        e
                    );
                    self.fail_over(&master).await;
                }
            }
        }
    }
}

fn absorb(result: Result<()>, worker: WorkerId, what: &str) {
    if let Err(e) = result {
        tracing::warn!(worker_id = %worker, "Failed to {}: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::job::{JobId, Split};
    use crate::mapper::MapRegistry;
    use crate::rpc::LocalDirectory;
    use crate::sink::MemorySink;
    use std::time::Duration;

    fn lone_node() -> (Arc<WorkerNode>, Arc<MemorySink>) {
        let directory = LocalDirectory::new(Duration::from_secs(1));
        let sink = MemorySink::new(
            "client",
            (0..6).map(|i| format!("line {}", i)).collect(),
        );
        directory.register_sink(sink.clone());
        let config = NodeConfig::new(WorkerId(1), "local://W1");
        let node = WorkerNode::new(config, directory.clone(), MapRegistry::with_builtins());
        directory.register_node(&node);
        (node, sink)
    }

    #[tokio::test]
    async fn test_unknown_map_function_rejected_on_load() {
        let (node, _sink) = lone_node();
        let result = node
            .handle_load_submit(SubmitContext {
                job_id: JobId::new(),
                client_addr: "client".to_string(),
                map_name: "missing".to_string(),
                splits: vec![Split::new(0, 0, 5)],
                controller: WorkerId(1),
            })
            .await;

        assert!(matches!(result, Err(ClusterError::Configuration(_))));
        assert_eq!(node.context.lock().await.operation, Operation::Idle);
    }

    #[tokio::test]
    async fn test_later_submit_overwrites_earlier() {
        let (node, _sink) = lone_node();
        for splits in [vec![Split::new(0, 0, 2)], vec![Split::new(1, 3, 5)]] {
            node.handle_load_submit(SubmitContext {
                job_id: JobId::new(),
                client_addr: "client".to_string(),
                map_name: "word_count".to_string(),
                splits,
                controller: WorkerId(1),
            })
            .await
            .unwrap();
        }

        let ctx = node.context.lock().await;
        assert_eq!(ctx.pending, vec![Split::new(1, 3, 5)]);
        assert_eq!(ctx.generation, 2);
    }

    #[tokio::test]
    async fn test_lone_node_runs_to_completion() {
        let (node, sink) = lone_node();
        node.start();

        let mut status = node.subscribe_status();
        node.handle_load_submit(SubmitContext {
            job_id: JobId::new(),
            client_addr: "client".to_string(),
            map_name: "word_count".to_string(),
            splits: vec![Split::new(0, 0, 2), Split::new(1, 3, 5)],
            controller: WorkerId(1),
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.write_count().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both splits written");

        tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| *s == WorkerStatus::Idle))
            .await
            .expect("engine back to idle")
            .unwrap();

        assert_eq!(sink.written_splits().await, vec![0, 1]);
        assert_eq!(node.lines_mapped(), 6);
        assert_eq!(node.splits_done(), 2);
    }
}
