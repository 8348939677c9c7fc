use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::gate::PauseGate;
use crate::job::WorkerId;

/// Tracker-side liveness timer for one monitored member.
///
/// Fires `on_expire` at most once, when no [`LivenessTimer::reset`] arrived
/// within `timeout`. While the tracker gate is closed the timer does not fire;
/// on reopening the member gets a fresh window. Dropping the timer stops it.
pub struct LivenessTimer {
    last_seen: Arc<watch::Sender<Instant>>,
    task: JoinHandle<()>,
}

impl LivenessTimer {
    pub fn start<F>(member: WorkerId, timeout: Duration, gate: PauseGate, on_expire: F) -> Self
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        let (tx, _rx) = watch::channel(Instant::now());
        let last_seen = Arc::new(tx);
        let watched = last_seen.clone();

        let task = tokio::spawn(async move {
            loop {
                let deadline = *watched.borrow() + timeout;
                tokio::time::sleep_until(deadline).await;

                if gate.is_paused() {
                    gate.wait_open().await;
                    watched.send_replace(Instant::now());
                    continue;
                }

                if Instant::now() >= *watched.borrow() + timeout {
                    tracing::warn!(worker_id = %member, "Liveness timer expired");
                    // The callback must not await fault handling here: handling
                    // removes the record that owns the timer, aborting this task.
                    on_expire(member);
                    return;
                }
            }
        });

        Self { last_seen, task }
    }

    pub fn reset(&self) {
        self.last_seen.send_replace(Instant::now());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LivenessTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
