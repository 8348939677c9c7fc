//! Fault-injection hooks, driven from the control CLI and the tests.

use std::time::Duration;
use tokio::time::Instant;

use super::node::WorkerNode;
use crate::error::Result;

impl WorkerNode {
    /// Makes every engine yield point sleep until `duration` from now.
    pub async fn slow(&self, duration: Duration) -> Result<()> {
        tracing::info!(worker_id = %self.id(), "Slowed for {:?}", duration);
        *self.slow_until.lock().await = Some(Instant::now() + duration);
        Ok(())
    }

    /// Parks the execution engine at its next yield point.
    pub fn freeze_worker(&self) -> Result<()> {
        if self.worker_gate.pause() {
            tracing::info!(worker_id = %self.id(), "Worker frozen");
        }
        Ok(())
    }

    pub fn unfreeze_worker(&self) -> Result<()> {
        if self.worker_gate.resume() {
            tracing::info!(worker_id = %self.id(), "Worker unfrozen");
        }
        Ok(())
    }

    /// Stops the tracker role: inbound tracker calls wait, heartbeats stop
    /// and liveness timers stand still.
    pub fn freeze_tracker(&self) -> Result<()> {
        if self.tracker_gate.pause() {
            tracing::info!(worker_id = %self.id(), "Tracker frozen");
        }
        Ok(())
    }

    /// Releases waiting tracker calls. Liveness timers restart with a full window.
    pub fn unfreeze_tracker(&self) -> Result<()> {
        if self.tracker_gate.resume() {
            tracing::info!(worker_id = %self.id(), "Tracker unfrozen");
        }
        Ok(())
    }
}
