use std::sync::Arc;
use tokio::sync::watch;

/// A cooperative pause flag.
///
/// Holders check it at yield points and park in [`PauseGate::wait_open`]
/// while it is closed. Nothing is ever suspended while holding a lock.
#[derive(Clone)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            paused: Arc::new(tx),
        }
    }

    /// Closes the gate. Returns `false` if it was already closed.
    pub fn pause(&self) -> bool {
        !self.paused.send_replace(true)
    }

    /// Opens the gate and releases every waiter. Returns `false` if it was already open.
    pub fn resume(&self) -> bool {
        self.paused.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Resolves immediately when open, otherwise once [`PauseGate::resume`] is called.
    pub async fn wait_open(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this only fails on a dropped gate.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
