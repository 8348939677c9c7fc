use std::time::Duration;

use crate::job::WorkerId;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STRAGGLER_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_REASSIGN_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-node settings.
///
/// `addr` is the opaque directory string peers use to reach this node
/// (`http://host:port` for the HTTP transport, anything unique for the
/// in-process one).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: WorkerId,
    pub addr: String,
    /// How often a member sends a lifeproof to its master tracker.
    pub heartbeat_interval: Duration,
    /// How long a tracker waits for a lifeproof before declaring the member faulty.
    pub liveness_timeout: Duration,
    /// Delay between a work-done report at the root and the straggler pass.
    pub straggler_delay: Duration,
    /// Wait between reassignment attempts when every member is busy.
    pub reassign_backoff: Duration,
    /// Time budget between partial-result flushes to the controller.
    pub flush_interval: Duration,
    /// Upper bound on a single outbound call.
    pub rpc_timeout: Duration,
}

impl NodeConfig {
    pub fn new(id: WorkerId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            straggler_delay: DEFAULT_STRAGGLER_DELAY,
            reassign_backoff: DEFAULT_REASSIGN_BACKOFF,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_straggler_delay(mut self, delay: Duration) -> Self {
        self.straggler_delay = delay;
        self
    }

    pub fn with_reassign_backoff(mut self, backoff: Duration) -> Self {
        self.reassign_backoff = backoff;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = NodeConfig::new(WorkerId(1), "local://W1");
        assert_eq!(cfg.id, WorkerId(1));
        assert_eq!(cfg.addr, "local://W1");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.liveness_timeout, Duration::from_secs(10));
        assert_eq!(cfg.straggler_delay, Duration::from_secs(10));
        assert_eq!(cfg.reassign_backoff, Duration::from_secs(5));
        assert_eq!(cfg.flush_interval, Duration::from_secs(10));
    }

    #[test]
    fn builders_override_timings() {
        let cfg = NodeConfig::new(WorkerId(2), "local://W2")
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_liveness_timeout(Duration::from_millis(200))
            .with_straggler_delay(Duration::from_millis(300))
            .with_reassign_backoff(Duration::from_millis(20))
            .with_flush_interval(Duration::from_millis(10))
            .with_rpc_timeout(Duration::from_millis(100));

        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(50));
        assert_eq!(cfg.liveness_timeout, Duration::from_millis(200));
        assert_eq!(cfg.straggler_delay, Duration::from_millis(300));
        assert_eq!(cfg.reassign_backoff, Duration::from_millis(20));
        assert_eq!(cfg.flush_interval, Duration::from_millis(10));
        assert_eq!(cfg.rpc_timeout, Duration::from_millis(100));
    }
}
