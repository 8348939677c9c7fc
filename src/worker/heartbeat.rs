use std::sync::Arc;

use super::node::WorkerNode;
use crate::membership::MemberInfo;

impl WorkerNode {
    /// Sends a lifeproof to the master tracker every heartbeat interval.
    ///
    /// Roots have no master and skip the beat. A frozen tracker stops
    /// beating until it is unfrozen.
    pub(crate) async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }

            if self.tracker_gate.is_paused() {
                continue;
            }

            self.send_lifeproof().await;
        }

        tracing::debug!(worker_id = %self.id(), "Heartbeat stopped");
    }

    /// One beat, retried against the father tracker while masters keep failing.
    /// A call that fails or outlives the transport timeout counts as a failure.
    pub(crate) async fn send_lifeproof(self: &Arc<Self>) {
        while let Some(master) = self.master().await {
            let handle = self.handle_for(&master).await;

            match handle.lifeproof(self.info.clone()).await {
                Ok(father) => {
                    let father = father.filter(|f| f.id != self.id());
                    let mut links = self.links.write().await;
                    if links.master.as_ref() == Some(&master) {
                        links.father = father;
                    }
                    tracing::trace!(worker_id = %self.id(), peer = %master.id, "Lifeproof acknowledged");
                    return;
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.id(), peer = %master.id, "Master tracker not responding: {}", e);
                }
            }

            self.fail_over(&master).await;
        }
    }

    /// Treats `failed` as gone: promotes the cached father to master and runs
    /// local fault handling for the lost tracker.
    ///
    /// Only acts when `failed` is still the current master, so concurrent
    /// detections promote once.
    pub(crate) async fn fail_over(self: &Arc<Self>, failed: &MemberInfo) -> Option<MemberInfo> {
        let promoted = {
            let mut links = self.links.write().await;
            if links.master.as_ref() != Some(failed) {
                return links.master.clone();
            }
            links.master = links.father.take();
            links.master.clone()
        };

        match &promoted {
            Some(father) => tracing::info!(
                worker_id = %self.id(),
                "Master tracker {} lost; promoted father {}",
                failed.id,
                father.id
            ),
            None => tracing::info!(
                worker_id = %self.id(),
                "Master tracker {} lost and no father cached; acting as root",
                failed.id
            ),
        }

        self.spawn_failure_handling(failed.id);
        promoted
    }
}
