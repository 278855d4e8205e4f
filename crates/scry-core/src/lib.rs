//! Core domain types and port definitions for the Scry service supervisor.
//!
//! This crate holds everything that does not touch a process, socket or
//! HTTP client: lifecycle state enums, the bounded-retry state machine, the
//! inference socket protocol, the configuration artifact, settings, the
//! canonical event union and the port traits the runtime implements.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ApplyOutcome, Backoff, ConfigMutation, ConnectionState, CoordinatorState, Decoded,
    InboundMessage, MalformedMessage, MutationError, OutboundMessage, ProcessInfo, ProcessState,
    PromptId, RetryDecision, RetryPolicy, RetryState, ServiceConfig, ServiceReport, ServiceStatus,
    StatusUpdate, content_hash, read_operation_id, script_working_dir,
};
pub use events::AppEvent;
pub use ports::{
    AppEventEmitter, CoordinatorError, CoreError, LedgerError, NoopEmitter, OperationsLedger,
    ReadinessProbe, RegistryError, ServerLogSinkPort, ServiceRestarter, SocketError,
    SupervisorError,
};
pub use settings::{
    CONTROL_SERVICE_ID, CoordinatorSettings, DEFAULT_CONTROL_PORT, DEFAULT_SOCKET_PORT,
    DEFAULT_TRANSFER_PORT, InferenceSettings, ServiceSettings, Settings, SettingsError,
    TRANSFER_SERVICE_ID, validate_settings,
};

// Re-export path utilities
pub use paths::{
    PathError, config_root, default_artifact_path, default_settings_path, ensure_directory,
    load_settings, resolve_artifact_path,
};
