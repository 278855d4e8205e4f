//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the supervisors expect from
//! infrastructure. They use only domain types.
//!
//! # Design Rules
//!
//! - No process, socket or HTTP client types in any signature
//! - Errors carry `String` payloads so they stay `Clone` and can be shared
//!   by every waiter of an in-flight operation

pub mod event_emitter;
pub mod ledger;
pub mod readiness;
pub mod restarter;
pub mod server_log_sink;

use thiserror::Error;

pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use ledger::OperationsLedger;
pub use readiness::ReadinessProbe;
pub use restarter::ServiceRestarter;
pub use server_log_sink::ServerLogSinkPort;

/// Errors from a supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Executable or working directory does not exist.
    #[error("Invalid executable: {0}")]
    InvalidExecutable(String),

    /// Pre-flight bind check failed.
    #[error("Port {0} is already in use")]
    PortInUse(u16),

    /// The OS refused to spawn the child.
    #[error("Failed to spawn {name}: {reason}")]
    SpawnFailed { name: String, reason: String },

    /// Readiness probe never passed within the startup window.
    #[error("{name} did not become ready within {timeout_ms}ms (timed out)")]
    StartupTimeout { name: String, timeout_ms: u64 },

    /// Child exited before it became ready.
    #[error("{name} exited during startup (exit code {code:?})")]
    CrashExit { name: String, code: Option<i32> },

    /// A stop request interrupted the start.
    #[error("Start of {0} was aborted by a stop request")]
    Aborted(String),

    /// Stop or signal delivery failed.
    #[error("Failed to stop {name}: {reason}")]
    StopFailed { name: String, reason: String },

    /// Internal error (task panicked, channel closed).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Whether an automatic retry can reasonably succeed.
    ///
    /// Configuration problems (missing executable, occupied port) are not
    /// retried; they need a human.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. } | Self::StartupTimeout { .. } | Self::CrashExit { .. }
        )
    }
}

/// Errors from the socket client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("Socket is not connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to send frame: {0}")]
    Send(String),
}

/// Errors from the service registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown service: {0}")]
    NotFound(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Errors from the operations ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Request(String),

    #[error("Ledger returned status {0}")]
    Status(u16),
}

/// Errors from the configuration-change coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// File watch could not be set up.
    #[error("Watch error: {0}")]
    Watch(String),

    /// The coordinator task is already running.
    #[error("Coordinator is already running")]
    AlreadyRunning,

    /// Restart or readiness failed on one attempt.
    #[error("Attempt {attempt} failed: {reason}")]
    AttemptFailed { attempt: u32, reason: String },

    /// Every attempt failed.
    #[error("Configuration apply failed after {attempts} attempts: {last_error}")]
    ConfigApplyFailure { attempts: u32, last_error: String },
}

/// Core error type for semantic domain errors.
///
/// Adapters map this to their own error types (CLI exit codes, IPC payloads).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    #[error(transparent)]
    Path(#[from] crate::paths::PathError),

    /// Validation error (invalid input).
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!SupervisorError::PortInUse(8080).is_retryable());
        assert!(!SupervisorError::InvalidExecutable("/nope".to_string()).is_retryable());
        assert!(!SupervisorError::Aborted("svc".to_string()).is_retryable());
        assert!(
            SupervisorError::StartupTimeout {
                name: "svc".to_string(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(
            SupervisorError::CrashExit {
                name: "svc".to_string(),
                code: Some(1)
            }
            .is_retryable()
        );
    }

    #[test]
    fn port_in_use_message() {
        assert_eq!(
            SupervisorError::PortInUse(8080).to_string(),
            "Port 8080 is already in use"
        );
    }

    #[test]
    fn registry_error_wraps_supervisor_error() {
        let err: RegistryError = SupervisorError::PortInUse(9000).into();
        assert_eq!(err.to_string(), "Port 9000 is already in use");
    }
}
