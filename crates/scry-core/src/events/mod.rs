//! Canonical event union for everything the supervision core reports.
//!
//! # Structure
//!
//! - Chat signals the UI renders (connection, tokens, prompt lifecycle)
//! - Supervision signals (process state, restarts, service health)
//! - Coordinator progress
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "new_token", "promptId": "5d1e…", "token": "Hel" }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{CoordinatorState, ProcessState, PromptId};

/// Canonical event types. Each variant carries enough context to be
/// rendered on its own; one event is emitted per occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Chat Socket ==========
    /// Socket connection opened; the model is reachable.
    Connected,

    /// Socket connection closed.
    Disconnected,

    /// A streamed token for an in-flight prompt.
    NewToken {
        #[serde(rename = "promptId")]
        prompt_id: PromptId,
        token: String,
    },

    /// Generation finished for a prompt.
    Complete {
        #[serde(rename = "promptId")]
        prompt_id: PromptId,
    },

    /// Prompt-level or connection-level error. Connection errors have no
    /// prompt id.
    Error {
        #[serde(rename = "promptId")]
        prompt_id: Option<PromptId>,
        error: String,
    },

    /// Server accepted a prompt.
    Started {
        #[serde(rename = "promptId")]
        prompt_id: Option<PromptId>,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },

    /// Server acknowledged a cancel.
    Canceled {
        #[serde(rename = "promptId")]
        prompt_id: Option<PromptId>,
    },

    /// Server cleared its conversation memory.
    MemoryCleared {
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },

    /// Fatal: a restart budget is exhausted and a manual restart is needed.
    CriticalError {
        /// Name of the process that gave up.
        source: String,
        message: String,
    },

    // ========== Supervision ==========
    /// A supervised process changed lifecycle state.
    ProcessStateChanged { name: String, state: ProcessState },

    /// A supervised process passed its readiness probe.
    ProcessReady { name: String, pid: Option<u32> },

    /// A supervised process exited unexpectedly.
    ProcessCrashed {
        name: String,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        #[serde(rename = "restartCount")]
        restart_count: u32,
    },

    /// An automatic restart has been scheduled.
    RestartScheduled {
        name: String,
        attempt: u32,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },

    /// Periodic health poll observed a change.
    ServiceHealthChanged { name: String, healthy: bool },

    // ========== Coordinator ==========
    /// Coordinator moved to a new protocol step.
    CoordinatorStateChanged { state: CoordinatorState },

    /// A model change was applied and the barrier passed.
    ConfigApplied {
        #[serde(rename = "modelName")]
        model_name: String,
        #[serde(rename = "operationId")]
        operation_id: Option<String>,
    },
}

impl AppEvent {
    /// Connection-level error (no prompt id).
    pub fn connection_error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            prompt_id: None,
            error: format!("Connection error: {message}"),
        }
    }

    /// Get the event name for routing (matches the serde tag).
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NewToken { .. } => "new_token",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Started { .. } => "started",
            Self::Canceled { .. } => "canceled",
            Self::MemoryCleared { .. } => "memory_cleared",
            Self::CriticalError { .. } => "critical_error",
            Self::ProcessStateChanged { .. } => "process_state_changed",
            Self::ProcessReady { .. } => "process_ready",
            Self::ProcessCrashed { .. } => "process_crashed",
            Self::RestartScheduled { .. } => "restart_scheduled",
            Self::ServiceHealthChanged { .. } => "service_health_changed",
            Self::CoordinatorStateChanged { .. } => "coordinator_state_changed",
            Self::ConfigApplied { .. } => "config_applied",
        }
    }

    /// Whether this event belongs on the chat surface.
    pub const fn is_chat_signal(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::Disconnected
                | Self::NewToken { .. }
                | Self::Complete { .. }
                | Self::Error { .. }
                | Self::Started { .. }
                | Self::Canceled { .. }
                | Self::MemoryCleared { .. }
                | Self::CriticalError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_serde_tag() {
        let events = [
            AppEvent::Connected,
            AppEvent::NewToken {
                prompt_id: "p".into(),
                token: "t".to_string(),
            },
            AppEvent::connection_error("refused"),
            AppEvent::ProcessStateChanged {
                name: "inference".to_string(),
                state: ProcessState::Running,
            },
            AppEvent::CoordinatorStateChanged {
                state: CoordinatorState::Applying { attempt: 1 },
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_name());
        }
    }

    #[test]
    fn connection_error_has_no_prompt() {
        let json = serde_json::to_value(AppEvent::connection_error("refused")).unwrap();
        assert!(json["promptId"].is_null());
        assert_eq!(json["error"], "Connection error: refused");
    }

    #[test]
    fn chat_signals_are_classified() {
        assert!(AppEvent::Disconnected.is_chat_signal());
        assert!(!AppEvent::ServiceHealthChanged {
            name: "transfer".to_string(),
            healthy: false
        }
        .is_chat_signal());
    }
}
