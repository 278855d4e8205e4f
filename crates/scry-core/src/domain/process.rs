//! Supervised process lifecycle types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// No OS process exists.
    Stopped,
    /// Spawned, waiting for the readiness probe.
    Starting,
    /// Readiness probe passed.
    Running,
    /// Exited unexpectedly; a restart decision is pending.
    Crashed,
    /// Waiting out the backoff before the next automatic start.
    Restarting,
    /// Restart budget exhausted. Only a manual restart leaves this state.
    Failed,
}

impl ProcessState {
    /// Whether an OS process may currently exist for this state.
    #[must_use]
    pub const fn has_process(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Whether automatic supervision has given up.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Crashed => "crashed",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time snapshot of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    /// Human-readable name used in logs and events.
    pub name: String,
    pub state: ProcessState,
    /// OS pid of the live child, if any.
    pub pid: Option<u32>,
    /// Consecutive crashes counted against the restart budget.
    pub restart_count: u32,
    pub max_restarts: u32,
    /// When the current (or last) child was spawned.
    pub started_at: Option<DateTime<Utc>>,
}

impl ProcessInfo {
    /// Seconds since the current child was spawned, while one is live.
    #[must_use]
    pub fn uptime_secs(&self) -> Option<u64> {
        if !self.state.has_process() {
            return None;
        }
        self.started_at.map(|started| {
            let elapsed = Utc::now().signed_duration_since(started).num_seconds();
            u64::try_from(elapsed).unwrap_or(0)
        })
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ProcessState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_live_states_have_a_process() {
        assert!(ProcessState::Starting.has_process());
        assert!(ProcessState::Running.has_process());
        assert!(!ProcessState::Crashed.has_process());
        assert!(!ProcessState::Restarting.has_process());
        assert!(!ProcessState::Failed.has_process());
        assert!(!ProcessState::Stopped.has_process());
    }

    #[test]
    fn uptime_is_only_reported_for_live_processes() {
        let mut info = ProcessInfo {
            name: "inference".to_string(),
            state: ProcessState::Running,
            pid: Some(42),
            restart_count: 0,
            max_restarts: 3,
            started_at: Some(Utc::now() - chrono::Duration::seconds(10)),
        };
        assert!(info.uptime_secs().is_some_and(|s| s >= 9));

        info.state = ProcessState::Stopped;
        assert_eq!(info.uptime_secs(), None);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessState::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
    }
}
