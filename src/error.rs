//! Error taxonomy for the coordination core.
//!
//! Communication failures are recovered where they happen (the peer is treated
//! as gone), configuration failures go back to whoever submitted the job, and
//! state errors are logged and dropped by internal callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Peer unreachable, timed out, or replied with something we cannot decode.
    #[error("communication with {peer} failed: {reason}")]
    Communication { peer: String, reason: String },

    /// Bad job parameters or an unknown map function.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Redundant or out-of-order membership/timer operation.
    #[error("state error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    pub fn communication(peer: impl Into<String>, reason: impl ToString) -> Self {
        ClusterError::Communication {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, ClusterError::Communication { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ClusterError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
