//! Controller Cache
//!
//! Each worker is the controller of exactly one other member and keeps a
//! copy of that member's input and partial output. When the member dies or
//! straggles, whoever resumes its work on this node starts from the copy.

use super::context::ControlledWork;
use super::node::WorkerNode;
use crate::error::Result;
use crate::job::WorkerId;
use crate::rpc::{OutputUpdate, SplitsUpdate};

impl WorkerNode {
    pub async fn handle_update_submit(&self, update: SplitsUpdate) -> Result<()> {
        let mut controlled = self.controlled.lock().await;

        if update.remaining.is_empty() {
            controlled.remove(&update.controlled);
            tracing::debug!(worker_id = %self.id(), "{} finished; cache dropped", update.controlled);
            return Ok(());
        }

        match update.fetched {
            Some(fetched) => {
                tracing::debug!(
                    worker_id = %self.id(),
                    "Caching input of {}: {} splits",
                    update.controlled,
                    fetched.len()
                );
                controlled.insert(
                    update.controlled,
                    ControlledWork {
                        remaining: update.remaining,
                        fetched,
                        outputs: Default::default(),
                    },
                );
            }
            None => {
                let work = controlled.entry(update.controlled).or_default();
                work.remaining = update.remaining;
                work.prune();
            }
        }
        Ok(())
    }

    pub async fn handle_update_output(&self, update: OutputUpdate) -> Result<()> {
        let mut controlled = self.controlled.lock().await;
        let work = controlled.entry(update.controlled).or_default();
        for (line, pairs) in update.lines {
            work.outputs.entry(line).or_insert(pairs);
        }
        Ok(())
    }

    /// Splits cached for `controlled`, if this node controls it.
    pub async fn controlled_remaining(&self, controlled: WorkerId) -> Option<Vec<u32>> {
        self.controlled
            .lock()
            .await
            .get(&controlled)
            .map(|w| w.remaining.iter().map(|s| s.id).collect())
    }
}
