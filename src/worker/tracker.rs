//! Tracker Role
//!
//! The part of a worker that admits members, watches their lifeproofs,
//! deals jobs, and moves work away from members that failed or fell behind.
//!
//! Every entry point waits while the tracker is frozen. Remote calls are made
//! after the table lock is released; the only step that reads and writes an
//! assignment slot together is `MembershipTable::place_orphan`, done under
//! the lock.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::context::JobState;
use super::events::NodeEvent;
use super::node::WorkerNode;
use crate::error::{ClusterError, Result};
use crate::job::{
    Assignment, JobId, JobReceipt, JobRequest, WorkerId, controller_for, deal_splits, partition,
};
use crate::membership::{InsertOutcome, LivenessTimer, MemberInfo};
use crate::rpc::{
    JoinKind, ResumeContext, SplitsUpdate, SubmitContext, TrackerLinks, WorkReport, WorkerRpc,
};

impl WorkerNode {
    // ============================================================
    // MEMBERSHIP
    // ============================================================

    pub async fn handle_join(self: &Arc<Self>, member: MemberInfo, kind: JoinKind) -> Result<()> {
        if member.id == self.id() {
            return Ok(());
        }
        self.tracker_gate.wait_open().await;

        self.relay_join_upward(&member).await;

        match kind {
            JoinKind::Direct => self.admit(member).await,
            JoinKind::Propagated => {
                let handle = self.directory.worker(&member.addr);
                let outcome = self.table.lock().await.insert(member.clone(), handle, None);
                if outcome == InsertOutcome::Inserted {
                    tracing::info!(worker_id = %self.id(), "Learned of {} through propagation", member);
                    self.emit(NodeEvent::MemberJoined { worker: member.id });
                }
            }
        }
        Ok(())
    }

    /// Makes this node the master tracker of `member`.
    ///
    /// Inserts (or completes) its record with a liveness timer, points its
    /// links here, and on first contact tells everyone else about it and
    /// sends it the full member list.
    async fn admit(self: &Arc<Self>, member: MemberInfo) {
        let handle = self.directory.worker(&member.addr);
        let timer = self.liveness_timer(member.id);

        let (outcome, others, snapshot) = {
            let mut table = self.table.lock().await;
            let outcome = table.insert(member.clone(), handle.clone(), Some(timer));
            let others: Vec<(WorkerId, Arc<dyn WorkerRpc>)> = table
                .ids()
                .into_iter()
                .filter(|id| *id != self.id() && *id != member.id)
                .filter_map(|id| table.handle(id).map(|h| (id, h)))
                .collect();
            (outcome, others, table.infos())
        };

        let links = TrackerLinks {
            master: Some(self.info.clone()),
            father: self.master().await,
        };
        if let Err(e) = handle.set_tracker_links(links).await {
            tracing::warn!(worker_id = %self.id(), peer = %member.id, "Failed to link new member: {}", e);
        }

        if outcome == InsertOutcome::Unchanged {
            return;
        }

        tracing::info!(worker_id = %self.id(), "Now tracking {} ({:?})", member, outcome);
        if outcome == InsertOutcome::Inserted {
            self.emit(NodeEvent::MemberJoined { worker: member.id });
        }

        let node_id = self.id();
        let announced = member.clone();
        tokio::spawn(async move {
            for (id, other) in others {
                if let Err(e) = other.receive_member(announced.clone()).await {
                    tracing::warn!(worker_id = %node_id, peer = %id, "Broadcast of {} failed: {}", announced.id, e);
                }
            }
        });

        if let Err(e) = handle.receive_member_list(snapshot).await {
            tracing::warn!(worker_id = %self.id(), peer = %member.id, "Failed to send member list: {}", e);
        }
    }

    async fn relay_join_upward(&self, member: &MemberInfo) {
        let Some(master) = self.master().await else {
            return;
        };
        if master.id == member.id {
            return;
        }
        let handle = self.handle_for(&master).await;
        let member = member.clone();
        let id = self.id();
        tokio::spawn(async move {
            if let Err(e) = handle.join(member, JoinKind::Propagated).await {
                tracing::warn!(worker_id = %id, "Failed to propagate join upward: {}", e);
            }
        });
    }

    fn liveness_timer(&self, member: WorkerId) -> LivenessTimer {
        let weak = self.weak_self.clone();
        LivenessTimer::start(
            member,
            self.config.liveness_timeout,
            self.tracker_gate.clone(),
            move |id| {
                if let Some(node) = weak.upgrade() {
                    node.spawn_failure_handling(id);
                }
            },
        )
    }

    pub async fn handle_receive_member(&self, member: MemberInfo) -> Result<()> {
        if member.id == self.id() {
            return Ok(());
        }
        self.tracker_gate.wait_open().await;
        let handle = self.directory.worker(&member.addr);
        if self.table.lock().await.insert(member.clone(), handle, None) == InsertOutcome::Inserted {
            tracing::info!(worker_id = %self.id(), "Told about new member {}", member);
            self.emit(NodeEvent::MemberJoined { worker: member.id });
        }
        Ok(())
    }

    pub async fn handle_receive_member_list(&self, members: Vec<MemberInfo>) -> Result<()> {
        self.tracker_gate.wait_open().await;
        let mut learned = Vec::new();
        {
            let mut table = self.table.lock().await;
            for member in members.into_iter().filter(|m| m.id != self.id()) {
                let handle = self.directory.worker(&member.addr);
                if table.insert(member.clone(), handle, None) == InsertOutcome::Inserted {
                    learned.push(member.id);
                }
            }
        }
        tracing::info!(worker_id = %self.id(), "Member list received; {} new", learned.len());
        for worker in learned {
            self.emit(NodeEvent::MemberJoined { worker });
        }
        Ok(())
    }

    pub async fn handle_set_tracker_links(&self, links: TrackerLinks) -> Result<()> {
        let own = |m: &Option<MemberInfo>| m.as_ref().is_some_and(|m| m.id == self.id());
        if own(&links.master) {
            return Err(ClusterError::State("a node cannot track itself".to_string()));
        }
        let links = TrackerLinks {
            father: if own(&links.father) { None } else { links.father },
            master: links.master,
        };
        tracing::info!(
            worker_id = %self.id(),
            "Master tracker {:?}, father {:?}",
            links.master.as_ref().map(|m| m.id),
            links.father.as_ref().map(|f| f.id)
        );
        *self.links.write().await = links;
        Ok(())
    }

    /// Lifeproof receipt. Unknown or unmonitored senders are re-admitted,
    /// which is how members adopt a new tracker after a fail-over.
    pub async fn handle_lifeproof(self: &Arc<Self>, member: MemberInfo) -> Result<Option<MemberInfo>> {
        self.tracker_gate.wait_open().await;

        let monitored = self.table.lock().await.reset_timer(member.id);
        if !monitored && member.id != self.id() {
            tracing::info!(worker_id = %self.id(), "Lifeproof from untracked {}; re-admitting", member);
            let node = self.clone();
            tokio::spawn(async move {
                node.relay_join_upward(&member).await;
                node.admit(member).await;
            });
        }

        Ok(self.master().await)
    }

    // ============================================================
    // WORK COMPLETION
    // ============================================================

    /// Completion report from a member or from below.
    ///
    /// The slot is cleared only when the report names the current job and
    /// splits the member still holds; a late report from a run whose work
    /// has since moved is logged and dropped.
    pub async fn handle_work_done(self: &Arc<Self>, report: WorkReport) -> Result<()> {
        self.tracker_gate.wait_open().await;

        let current_job = self.job.lock().await.as_ref().map(|job| job.job_id.clone());
        let (matched, outstanding) = {
            let mut table = self.table.lock().await;
            let matched = match &current_job {
                Some(job_id) if *job_id != report.job_id => false,
                _ => table
                    .finish_assignment(report.worker, &report.splits)
                    .is_some(),
            };
            (
                matched,
                table.has_outstanding_work() || self.orphans.load(Ordering::SeqCst) > 0,
            )
        };

        if let Some(master) = self.master().await {
            let handle = self.handle_for(&master).await;
            let id = self.id();
            tokio::spawn(async move {
                let worker = report.worker;
                if let Err(e) = handle.work_done(report).await {
                    tracing::warn!(worker_id = %id, "Failed to forward work done of {}: {}", worker, e);
                }
            });
            return Ok(());
        }

        if !matched {
            tracing::info!(
                worker_id = %self.id(),
                "Ignoring stale work done from {} for splits {:?}",
                report.worker,
                report.splits
            );
            return Ok(());
        }

        tracing::info!(worker_id = %self.id(), "Work done: {} {:?}", report.worker, report.splits);

        if outstanding {
            self.schedule_straggler_check();
            return Ok(());
        }

        if let Some(job) = self.job.lock().await.take() {
            tracing::info!(worker_id = %self.id(), "Job {} completed", job.job_id.0);
            self.emit(NodeEvent::JobCompleted { job_id: job.job_id });
        }
        Ok(())
    }

    // ============================================================
    // FAULT HANDLING
    // ============================================================

    /// Runs fault handling for `failed` in the background.
    pub fn spawn_failure_handling(self: &Arc<Self>, failed: WorkerId) {
        let node = self.clone();
        tokio::spawn(async move {
            node.handle_member_failure(failed).await;
        });
    }

    /// A failure reported by another node.
    ///
    /// When this node monitors `failed` itself, its own timer decides: a
    /// member that still answers a probe is kept. This filters reports from
    /// trackers that lost the member after a fail-over.
    pub fn spawn_failure_report(self: &Arc<Self>, failed: WorkerId) {
        let node = self.clone();
        tokio::spawn(async move {
            let monitored = {
                let table = node.table.lock().await;
                table.get(failed).filter(|r| r.timer.is_some()).map(|r| r.handle.clone())
            };
            if let Some(handle) = monitored
                && handle.probe().await.is_ok()
            {
                tracing::info!(worker_id = %node.id(), "Ignoring failure report for live member {}", failed);
                return;
            }
            node.handle_member_failure(failed).await;
        });
    }

    /// Removes `failed`, tells the master tracker, and re-homes its work.
    ///
    /// Idempotent: a second report for the same member finds no record and
    /// stops there.
    async fn handle_member_failure(self: Arc<Self>, failed: WorkerId) {
        if failed == self.id() || self.is_dead() {
            return;
        }
        self.tracker_gate.wait_open().await;

        let (record, member_count) = {
            let mut table = self.table.lock().await;
            let member_count = table.len();
            match table.remove(failed) {
                Ok(record) => {
                    if record.assignment.is_some() {
                        self.orphans.fetch_add(1, Ordering::SeqCst);
                    }
                    (record, member_count)
                }
                Err(e) => {
                    tracing::debug!(worker_id = %self.id(), "Ignoring failure report: {}", e);
                    return;
                }
            }
        };

        tracing::warn!(worker_id = %self.id(), "Member {} failed; removed", failed);
        self.emit(NodeEvent::MemberRemoved { worker: failed });

        if let Some(master) = self.master().await
            && master.id != failed
        {
            let handle = self.handle_for(&master).await;
            if let Err(e) = handle.member_failed(failed).await {
                tracing::warn!(worker_id = %self.id(), "Failed to report {} upward: {}", failed, e);
            }
        }

        let Some(orphan) = record.assignment else {
            return;
        };

        tracing::warn!(
            worker_id = %self.id(),
            "{} failed holding {} splits",
            failed,
            orphan.splits.len()
        );
        let preferred = controller_for(failed, member_count);
        if let Some(target) = self.reassign(orphan, preferred).await
            && target != preferred
        {
            self.release_controller_copy(preferred, failed).await;
        }
    }

    /// Tells `controller` to drop its copy of `failed`'s work, which went to
    /// another member.
    async fn release_controller_copy(&self, controller: WorkerId, failed: WorkerId) {
        let Some(handle) = self.table.lock().await.handle(controller) else {
            return;
        };
        let release = SplitsUpdate {
            controlled: failed,
            remaining: Vec::new(),
            fetched: None,
        };
        if let Err(e) = handle.update_submit(release).await {
            tracing::debug!(worker_id = %self.id(), peer = %controller, "Failed to release copy of {}: {}", failed, e);
        }
    }

    /// Hands `orphan` to `preferred` or the first idle member, retrying after
    /// the reassignment backoff while everyone is busy. Returns the member it
    /// went to.
    async fn reassign(self: &Arc<Self>, orphan: Assignment, preferred: WorkerId) -> Option<WorkerId> {
        loop {
            if self.is_dead() {
                self.orphans.fetch_sub(1, Ordering::SeqCst);
                return None;
            }

            let placed = {
                let mut table = self.table.lock().await;
                let placed = table.place_orphan(&orphan, preferred);
                if placed.is_some() {
                    self.orphans.fetch_sub(1, Ordering::SeqCst);
                }
                placed
            };
            if let Some(placed) = placed {
                let target = placed.owner;
                self.dispatch_resume(placed, orphan.owner).await;
                return Some(target);
            }

            tracing::info!(
                worker_id = %self.id(),
                "No idle member for work of {}; retrying in {:?}",
                orphan.owner,
                self.config.reassign_backoff
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.reassign_backoff) => {}
                _ = self.shutdown.cancelled() => {
                    self.orphans.fetch_sub(1, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    /// Sends a resume for work now recorded on `placed.owner`. A target that
    /// cannot be reached is handled as failed and one that refuses is handed
    /// off; either way the work moves again.
    async fn dispatch_resume(self: &Arc<Self>, placed: Assignment, from: WorkerId) {
        let target = placed.owner;
        tracing::info!(worker_id = %self.id(), "Assigning work of {} to {}", from, target);
        self.emit(NodeEvent::AssignmentMoved {
            from,
            to: target,
            splits: placed.splits.iter().map(|s| s.id).collect(),
        });

        let Some(job) = self.job.lock().await.clone() else {
            tracing::warn!(worker_id = %self.id(), "No job metadata; cannot resume work of {}", from);
            return;
        };

        let (handle, member_count) = {
            let table = self.table.lock().await;
            (table.handle(target), table.len())
        };
        let Some(handle) = handle else {
            return;
        };

        let context = ResumeContext {
            job_id: job.job_id,
            client_addr: job.client_addr,
            map_name: job.map_name,
            splits: placed.splits.clone(),
            controller: controller_for(target, member_count),
            from_worker: from,
        };

        if let Err(e) = handle.load_resume(context).await {
            tracing::warn!(worker_id = %self.id(), peer = %target, "Resume dispatch failed: {}", e);
            if e.is_communication() {
                self.spawn_failure_handling(target);
            } else {
                self.spawn_refusal_hand_off(placed);
            }
        }
    }

    /// Moves work its owner refused to load, in the background.
    fn spawn_refusal_hand_off(self: &Arc<Self>, refused: Assignment) {
        let node = self.clone();
        tokio::spawn(async move {
            node.hand_off_refused(refused).await;
        });
    }

    /// The refuser keeps its slot while a new owner is picked, so it cannot
    /// be picked itself; the slot is emptied afterwards. With no idle member
    /// the work waits in the reassignment backoff like an orphan.
    async fn hand_off_refused(self: Arc<Self>, refused: Assignment) {
        let owner = refused.owner;
        let (placed, preferred) = {
            let mut table = self.table.lock().await;
            if table.assignment(owner) != Some(&refused) {
                return;
            }
            let preferred = controller_for(owner, table.len());
            let placed = table.place_orphan(&refused, preferred);
            table.take_assignment(owner);
            if placed.is_none() {
                self.orphans.fetch_add(1, Ordering::SeqCst);
            }
            (placed, preferred)
        };

        tracing::warn!(worker_id = %self.id(), "{} refused its work; handing it off", owner);
        match placed {
            Some(placed) => self.dispatch_resume(placed, owner).await,
            None => {
                // The refuser is idle now; give the others a backoff to free up first.
                tokio::select! {
                    _ = tokio::time::sleep(self.config.reassign_backoff) => {}
                    _ = self.shutdown.cancelled() => {
                        self.orphans.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                }
                self.reassign(refused, preferred).await;
            }
        }
    }

    // ============================================================
    // STRAGGLERS
    // ============================================================

    fn schedule_straggler_check(self: &Arc<Self>) {
        if self.straggler_check_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let node = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(node.config.straggler_delay) => {}
                _ = node.shutdown.cancelled() => return,
            }
            node.straggler_check_pending.store(false, Ordering::SeqCst);
            node.relocate_stragglers().await;
        });
    }

    /// One pass: every member still holding work is a straggler; each is
    /// moved to a distinct idle member until none is idle.
    pub(crate) async fn relocate_stragglers(self: &Arc<Self>) {
        self.tracker_gate.wait_open().await;

        let moves = {
            let mut table = self.table.lock().await;
            let member_count = table.len();
            let mut moves = Vec::new();
            for straggler in table.busy_members() {
                let Some(orphan) = table.assignment(straggler).cloned() else {
                    continue;
                };
                match table.place_orphan(&orphan, controller_for(straggler, member_count)) {
                    Some(placed) => moves.push((straggler, placed)),
                    None => break,
                }
            }
            // Slots are emptied last so no straggler receives work in its own pass.
            for (straggler, _) in &moves {
                table.take_assignment(*straggler);
            }
            moves
        };

        for (straggler, placed) in moves {
            tracing::warn!(worker_id = %self.id(), "{} is a straggler", straggler);
            self.dispatch_resume(placed, straggler).await;
        }
    }

    // ============================================================
    // JOB SUBMISSION
    // ============================================================

    /// Entry point for an external submitter.
    ///
    /// Forwarded up the tracker chain so the root, which receives every
    /// work-done report, is also the node that records the assignments.
    pub async fn handle_submit_job(self: &Arc<Self>, request: JobRequest) -> Result<JobReceipt> {
        validate(&request, self)?;

        if let Some(master) = self.master().await {
            let handle = self.handle_for(&master).await;
            match handle.submit_job(request.clone()).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_communication() => {
                    tracing::warn!(worker_id = %self.id(), "Master unreachable; dealing job here: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.tracker_gate.wait_open().await;
        self.deal_job(request).await
    }

    async fn deal_job(self: &Arc<Self>, request: JobRequest) -> Result<JobReceipt> {
        let job_id = JobId::new();
        let splits = partition(request.file_size, request.n_splits);

        let (dispatches, member_count) = {
            let mut table = self.table.lock().await;
            if table.has_outstanding_work() {
                tracing::warn!(worker_id = %self.id(), "New job replaces the one in flight");
                table.clear_assignments();
            }
            let dealt = deal_splits(&table.ids(), &splits);
            let mut dispatches = Vec::with_capacity(dealt.len());
            for assignment in dealt {
                table.set_assignment(assignment.clone())?;
                if let Some(handle) = table.handle(assignment.owner) {
                    dispatches.push((assignment, handle));
                }
            }
            (dispatches, table.len())
        };

        *self.job.lock().await = Some(JobState {
            job_id: job_id.clone(),
            client_addr: request.client_addr.clone(),
            map_name: request.map_name.clone(),
        });

        tracing::info!(
            worker_id = %self.id(),
            "Job {}: {} lines in {} splits over {} members",
            job_id.0,
            request.file_size,
            splits.len(),
            dispatches.len()
        );

        let receipt = JobReceipt {
            job_id: job_id.clone(),
            splits: splits.len(),
            assigned_members: dispatches.len(),
        };

        for (assignment, handle) in dispatches {
            let owner = assignment.owner;
            let context = SubmitContext {
                job_id: job_id.clone(),
                client_addr: request.client_addr.clone(),
                map_name: request.map_name.clone(),
                splits: assignment.splits.clone(),
                controller: controller_for(owner, member_count),
            };
            let node = self.clone();
            tokio::spawn(async move {
                tracing::debug!(worker_id = %node.id(), "Submitting job to {}", owner);
                if let Err(e) = handle.load_submit(context).await {
                    tracing::warn!(worker_id = %node.id(), peer = %owner, "Submit dispatch failed: {}", e);
                    if e.is_communication() {
                        node.spawn_failure_handling(owner);
                    } else {
                        node.spawn_refusal_hand_off(assignment);
                    }
                }
            });
        }

        Ok(receipt)
    }
}

fn validate(request: &JobRequest, node: &WorkerNode) -> Result<()> {
    if request.file_size == 0 {
        return Err(ClusterError::Configuration(
            "file_size must be at least 1".to_string(),
        ));
    }
    if request.n_splits == 0 {
        return Err(ClusterError::Configuration(
            "n_splits must be at least 1".to_string(),
        ));
    }
    if request.client_addr.is_empty() {
        return Err(ClusterError::Configuration(
            "client address is missing".to_string(),
        ));
    }
    node.registry.resolve(&request.map_name)?;
    Ok(())
}
