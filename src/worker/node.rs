use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify, RwLock, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::{ControlledWork, ExecutionContext, JobState, Operation};
use super::events::NodeEvent;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::job::WorkerId;
use crate::mapper::MapRegistry;
use crate::membership::{MemberInfo, MembershipTable, PauseGate};
use crate::rpc::{Directory, JoinKind, LocalPeer, StatusReport, TrackerLinks, WorkerRpc, WorkerStatus};

const EVENT_CAPACITY: usize = 256;

/// One worker process: execution engine, heartbeat sender and tracker in one.
///
/// Shared state sits behind per-field async locks. No lock is held across a
/// call to another node; peers may call back into this node while one of its
/// own outbound calls is in flight.
pub struct WorkerNode {
    pub(crate) config: NodeConfig,
    pub(crate) info: MemberInfo,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) registry: Arc<MapRegistry>,
    pub(crate) weak_self: Weak<WorkerNode>,

    pub(crate) table: Mutex<MembershipTable>,
    pub(crate) links: RwLock<TrackerLinks>,
    pub(crate) job: Mutex<Option<JobState>>,
    pub(crate) controlled: Mutex<HashMap<WorkerId, ControlledWork>>,

    pub(crate) context: Mutex<ExecutionContext>,
    pub(crate) generation: AtomicU64,
    pub(crate) wake: Notify,

    pub(crate) worker_gate: PauseGate,
    pub(crate) tracker_gate: PauseGate,
    pub(crate) slow_until: Mutex<Option<Instant>>,
    pub(crate) straggler_check_pending: AtomicBool,
    /// Assignments removed with a failed member and not yet placed again.
    pub(crate) orphans: AtomicUsize,

    pub(crate) status: watch::Sender<WorkerStatus>,
    pub(crate) events: broadcast::Sender<NodeEvent>,
    pub(crate) lines_mapped: AtomicU64,
    pub(crate) splits_done: AtomicU64,
    pub(crate) shutdown: CancellationToken,
}

impl WorkerNode {
    pub fn new(
        config: NodeConfig,
        directory: Arc<dyn Directory>,
        registry: Arc<MapRegistry>,
    ) -> Arc<Self> {
        let info = MemberInfo::new(config.id, config.addr.clone());
        let (status, _) = watch::channel(WorkerStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Arc::new_cyclic(|weak: &Weak<WorkerNode>| {
            let mut table = MembershipTable::new();
            let self_handle: Arc<dyn WorkerRpc> = Arc::new(LocalPeer::new(
                info.addr.clone(),
                weak.clone(),
                config.rpc_timeout,
            ));
            table.insert(info.clone(), self_handle, None);

            Self {
                config,
                info,
                directory,
                registry,
                weak_self: weak.clone(),
                table: Mutex::new(table),
                links: RwLock::new(TrackerLinks::default()),
                job: Mutex::new(None),
                controlled: Mutex::new(HashMap::new()),
                context: Mutex::new(ExecutionContext::new()),
                generation: AtomicU64::new(0),
                wake: Notify::new(),
                worker_gate: PauseGate::new(),
                tracker_gate: PauseGate::new(),
                slow_until: Mutex::new(None),
                straggler_check_pending: AtomicBool::new(false),
                orphans: AtomicUsize::new(0),
                status,
                events,
                lines_mapped: AtomicU64::new(0),
                splits_done: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }
        })
    }

    /// Spawns the execution engine and the heartbeat sender.
    pub fn start(self: &Arc<Self>) {
        tracing::info!(worker_id = %self.id(), "Starting worker at {}", self.info.addr);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_engine().await;
        });

        let heartbeat = self.clone();
        tokio::spawn(async move {
            heartbeat.heartbeat_loop().await;
        });
    }

    /// Joins the pool through the member at `entry`, which becomes this
    /// node's master tracker.
    pub async fn join_pool(&self, entry: &str) -> Result<()> {
        tracing::info!(worker_id = %self.id(), "Joining pool through {}", entry);
        let tracker = self.directory.worker(entry);
        tracker.join(self.info.clone(), JoinKind::Direct).await
    }

    pub fn id(&self) -> WorkerId {
        self.info.id
    }

    pub fn info(&self) -> &MemberInfo {
        &self.info
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn is_dead(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancelled when the node dies.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<WorkerStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> WorkerStatus {
        *self.status.borrow()
    }

    pub fn lines_mapped(&self) -> u64 {
        self.lines_mapped.load(Ordering::Relaxed)
    }

    pub fn splits_done(&self) -> u64 {
        self.splits_done.load(Ordering::Relaxed)
    }

    pub async fn master(&self) -> Option<MemberInfo> {
        self.links.read().await.master.clone()
    }

    pub async fn father(&self) -> Option<MemberInfo> {
        self.links.read().await.father.clone()
    }

    pub async fn is_root(&self) -> bool {
        self.links.read().await.master.is_none()
    }

    pub async fn member_ids(&self) -> Vec<WorkerId> {
        self.table.lock().await.ids()
    }

    pub async fn has_timer_for(&self, id: WorkerId) -> bool {
        self.table.lock().await.has_timer(id)
    }

    /// The splits this node's table records for `id`, if any.
    pub async fn assignment_of(&self, id: WorkerId) -> Option<Vec<u32>> {
        self.table
            .lock()
            .await
            .assignment(id)
            .map(|a| a.splits.iter().map(|s| s.id).collect())
    }

    pub async fn owners_of(&self, split_id: u32) -> Vec<WorkerId> {
        self.table.lock().await.owners_of(split_id)
    }

    pub async fn has_job(&self) -> bool {
        self.job.lock().await.is_some()
    }

    /// Handle for `id`, from the table when known, else through the directory.
    pub(crate) async fn handle_for(&self, member: &MemberInfo) -> Arc<dyn WorkerRpc> {
        match self.table.lock().await.handle(member.id) {
            Some(handle) => handle,
            None => self.directory.worker(&member.addr),
        }
    }

    pub(crate) fn set_status(&self, status: WorkerStatus) {
        self.status.send_replace(status);
        tracing::debug!(worker_id = %self.id(), "Status: {}", status);
        self.emit(NodeEvent::StatusChanged {
            worker: self.id(),
            status,
        });
    }

    pub(crate) fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub async fn status_report(&self) -> StatusReport {
        let links = self.links.read().await.clone();
        let members = self.table.lock().await.ids();
        let pending_splits = self.context.lock().await.pending.len();

        StatusReport {
            id: self.id(),
            status: self.current_status(),
            master: links.master.map(|m| m.id),
            father: links.father.map(|f| f.id),
            members,
            pending_splits,
            splits_done: self.splits_done(),
            lines_mapped: self.lines_mapped(),
            worker_frozen: self.worker_gate.is_paused(),
            tracker_frozen: self.tracker_gate.is_paused(),
        }
    }

    /// Leaves the pool for good.
    ///
    /// The engine is told to exit, timers stop, the master tracker is told
    /// (best effort) that this node failed, and every handle to this node
    /// starts failing.
    pub async fn die(&self) {
        tracing::info!(worker_id = %self.id(), "Dying");

        {
            let mut ctx = self.context.lock().await;
            ctx.operation = Operation::Exit;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.wake.notify_one();

        if let Some(master) = self.master().await {
            let handle = self.handle_for(&master).await;
            let id = self.id();
            tokio::spawn(async move {
                if let Err(e) = handle.member_failed(id).await {
                    tracing::debug!(worker_id = %id, "Could not announce departure: {}", e);
                }
            });
        }

        self.shutdown.cancel();
        self.table.lock().await.stop_timers();
        self.worker_gate.resume();
        self.tracker_gate.resume();
    }
}
