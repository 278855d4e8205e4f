//! Settings domain types and validation.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to override.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{RetryPolicy, ServiceConfig};

/// Default port of the inference message socket.
pub const DEFAULT_SOCKET_PORT: u16 = 8765;

/// Default port of the HTTP control service (health, `/model-ready`).
pub const DEFAULT_CONTROL_PORT: u16 = 8001;

/// Default port of the resource-transfer service.
pub const DEFAULT_TRANSFER_PORT: u16 = 8080;

/// Registry id of the HTTP control service.
pub const CONTROL_SERVICE_ID: &str = "control";

/// Registry id of the resource-transfer service.
pub const TRANSFER_SERVICE_ID: &str = "transfer";

const fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// The inference process and its message socket.
    pub inference: InferenceSettings,
    /// HTTP control service.
    pub control: ServiceSettings,
    /// Resource-transfer service.
    pub transfer: ServiceSettings,
    /// Configuration-change coordinator.
    pub coordinator: CoordinatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            inference: InferenceSettings::default(),
            control: ServiceSettings::control(),
            transfer: ServiceSettings::transfer(),
            coordinator: CoordinatorSettings::default(),
        }
    }

    /// Parse a JSON settings document. Missing keys take their defaults.
    pub fn from_json(contents: &str) -> Result<Self, SettingsError> {
        if contents.trim().is_empty() {
            return Ok(Self::with_defaults());
        }
        let value: serde_json::Value =
            serde_json::from_str(contents).map_err(|e| SettingsError::Parse(e.to_string()))?;

        // Service sections default differently, so merge onto the populated
        // defaults rather than onto `Default`.
        let mut base = serde_json::to_value(Self::with_defaults())
            .map_err(|e| SettingsError::Parse(e.to_string()))?;
        merge_json(&mut base, value);
        serde_json::from_value(base).map_err(|e| SettingsError::Parse(e.to_string()))
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Inference process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InferenceSettings {
    /// Interpreter or binary to launch.
    pub executable: String,
    /// Arguments, typically the server script path first.
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub socket_host: String,
    pub socket_port: u16,
    /// Crashes tolerated before the process is marked failed.
    pub max_restarts: u32,
    /// Linear backoff base: the n-th automatic restart waits `n × base`.
    pub restart_delay_ms: u64,
    pub startup_timeout_ms: u64,
    pub readiness_interval_ms: u64,
    /// A run that lasts this long clears the crash count.
    pub stability_window_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Pause between stop and start on a manual restart.
    pub settle_delay_ms: u64,
    /// Fixed delay before the socket client reconnects.
    pub reconnect_delay_ms: u64,
    /// Forward child stderr lines to the UI as error events.
    pub forward_stderr: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            executable: "python3".to_string(),
            args: vec!["-u".to_string(), "llama_server.py".to_string()],
            working_dir: None,
            socket_host: "127.0.0.1".to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
            max_restarts: 3,
            restart_delay_ms: 3000,
            startup_timeout_ms: 15_000,
            readiness_interval_ms: 500,
            stability_window_ms: 30_000,
            shutdown_grace_ms: 5000,
            settle_delay_ms: 2000,
            reconnect_delay_ms: 3000,
            forward_stderr: true,
        }
    }
}

impl InferenceSettings {
    /// `ws://host:port` URL of the message socket.
    #[must_use]
    pub fn socket_url(&self) -> String {
        format!("ws://{}:{}", self.socket_host, self.socket_port)
    }

    #[must_use]
    pub const fn restart_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.max_restarts, ms(self.restart_delay_ms))
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        ms(self.reconnect_delay_ms)
    }
}

/// Settings for one registry service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Skip this service entirely when false.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub executable: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub health_path: String,
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
    pub startup_timeout_ms: u64,
    pub readiness_interval_ms: u64,
    pub stability_window_ms: u64,
    pub shutdown_grace_ms: u64,
    pub settle_delay_ms: u64,
    /// Interval of the log-only health poll while running.
    pub health_poll_interval_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::transfer()
    }
}

impl ServiceSettings {
    /// Defaults for the HTTP control service.
    #[must_use]
    pub fn control() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CONTROL_PORT,
            executable: "uvicorn".to_string(),
            args: vec![
                "main:app".to_string(),
                "--host".to_string(),
                "127.0.0.1".to_string(),
                "--port".to_string(),
                DEFAULT_CONTROL_PORT.to_string(),
            ],
            working_dir: None,
            health_path: "/health".to_string(),
            max_restarts: 3,
            restart_delay_ms: 800,
            startup_timeout_ms: 15_000,
            readiness_interval_ms: 500,
            stability_window_ms: 30_000,
            shutdown_grace_ms: 5000,
            settle_delay_ms: 800,
            health_poll_interval_ms: 30_000,
        }
    }

    /// Defaults for the resource-transfer service.
    #[must_use]
    pub fn transfer() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_TRANSFER_PORT,
            executable: "python3".to_string(),
            args: vec!["-u".to_string(), "download_server.py".to_string()],
            working_dir: None,
            health_path: "/health".to_string(),
            max_restarts: 3,
            restart_delay_ms: 5000,
            startup_timeout_ms: 90_000,
            readiness_interval_ms: 500,
            stability_window_ms: 30_000,
            shutdown_grace_ms: 10_000,
            settle_delay_ms: 1000,
            health_poll_interval_ms: 30_000,
        }
    }

    /// Launch/probe configuration for the registry.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(self.host.clone(), self.port, self.executable.clone())
            .with_args(self.args.iter().cloned());
        config.health_path.clone_from(&self.health_path);
        if let Some(dir) = &self.working_dir {
            config = config.with_working_dir(dir.clone());
        }
        config
    }

    #[must_use]
    pub const fn restart_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.max_restarts, ms(self.restart_delay_ms))
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Configuration-change coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub enabled: bool,
    /// Artifact to watch. Defaults to `model_config.json` in the config dir.
    pub artifact_path: Option<PathBuf>,
    pub debounce_ms: u64,
    /// Full restart-and-wait attempts per change.
    pub apply_attempts: u32,
    pub apply_retry_delay_ms: u64,
    /// Polls of each readiness check (HTTP, then socket port).
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    /// Connect timeout of one socket-port poll.
    pub port_probe_timeout_ms: u64,
    /// Base URL of the operations ledger (`POST {url}/model-ready`).
    pub ledger_url: String,
    pub ledger_timeout_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            artifact_path: None,
            debounce_ms: 5000,
            apply_attempts: 3,
            apply_retry_delay_ms: 2000,
            readiness_attempts: 60,
            readiness_interval_ms: 1000,
            port_probe_timeout_ms: 2000,
            ledger_url: format!("http://127.0.0.1:{DEFAULT_CONTROL_PORT}"),
            ledger_timeout_ms: 30_000,
        }
    }
}

impl CoordinatorSettings {
    #[must_use]
    pub const fn apply_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.apply_attempts, ms(self.apply_retry_delay_ms))
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        ms(self.debounce_ms)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("Port {0} is assigned to more than one service")]
    DuplicatePort(u16),

    #[error("{0} must be at least 1")]
    ZeroBudget(&'static str),

    #[error("Executable for {0} cannot be empty")]
    EmptyExecutable(&'static str),

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Failed to read settings file {path}: {reason}")]
    Read { path: String, reason: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let mut ports = vec![settings.inference.socket_port];
    for service in [&settings.control, &settings.transfer] {
        if service.enabled {
            ports.push(service.port);
        }
    }

    for (i, port) in ports.iter().enumerate() {
        if *port < 1024 {
            return Err(SettingsError::InvalidPort(*port));
        }
        if ports[..i].contains(port) {
            return Err(SettingsError::DuplicatePort(*port));
        }
    }

    if settings.inference.executable.trim().is_empty() {
        return Err(SettingsError::EmptyExecutable("inference"));
    }
    if settings.control.enabled && settings.control.executable.trim().is_empty() {
        return Err(SettingsError::EmptyExecutable("control"));
    }
    if settings.transfer.enabled && settings.transfer.executable.trim().is_empty() {
        return Err(SettingsError::EmptyExecutable("transfer"));
    }

    if settings.coordinator.apply_attempts == 0 {
        return Err(SettingsError::ZeroBudget("coordinator.apply_attempts"));
    }
    if settings.coordinator.readiness_attempts == 0 {
        return Err(SettingsError::ZeroBudget("coordinator.readiness_attempts"));
    }
    if settings.inference.startup_timeout_ms == 0 {
        return Err(SettingsError::ZeroBudget("inference.startup_timeout_ms"));
    }

    Ok(())
}
