//! VM lifecycle state types.

use serde::{Deserialize, Serialize};

/// VM lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum VmState {
    /// VM is booting.
    Booting,

    /// VM is ready (guest agent connected).
    Ready,

    /// VM is running with the agent channel closed.
    Running,

    /// VM vCPUs are paused.
    Paused,

    /// VM has stopped.
    Stopped,

    /// VM failed with error.
    Failed {
        /// Reason for failure.
        reason: String,
    },
}

impl VmState {
    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            VmState::Booting => "booting",
            VmState::Ready => "ready",
            VmState::Running => "running",
            VmState::Paused => "paused",
            VmState::Stopped => "stopped",
            VmState::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmState::Failed { reason } => write!(f, "failed: {}", reason),
            _ => write!(f, "{}", self.name()),
        }
    }
}
