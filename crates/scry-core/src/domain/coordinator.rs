//! Configuration-change coordinator state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the coordinator is in its apply protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    /// Change seen, waiting for the burst to settle.
    Debouncing,
    /// Restarting the inference process. `attempt` is 1-based.
    Applying { attempt: u32 },
    /// Restart issued, waiting on the readiness barrier.
    WaitingReady { attempt: u32 },
    /// Reporting the outcome to the operations ledger.
    Notifying,
    /// An attempt failed and another one is scheduled.
    Failed { attempt: u32 },
}

impl CoordinatorState {
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Debouncing => f.write_str("debouncing"),
            Self::Applying { attempt } => write!(f, "applying (attempt {attempt})"),
            Self::WaitingReady { attempt } => write!(f, "waiting for readiness (attempt {attempt})"),
            Self::Notifying => f.write_str("notifying"),
            Self::Failed { attempt } => write!(f, "failed (attempt {attempt}, retrying)"),
        }
    }
}

/// Outcome posted to the operations ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub operation_id: String,
    pub success: bool,
    pub message: String,
}

impl ApplyOutcome {
    pub fn success(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: true,
            message: "Server restarted successfully".to_string(),
        }
    }

    pub fn failure(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: false,
            message: message.into(),
        }
    }
}
