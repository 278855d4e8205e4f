//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where the runtime components are wired
//! together for the CLI:
//! - One `EventBroadcaster` shared by every component
//! - A `ServerLogBuffer` capturing child output
//! - The service registry (control + transfer)
//! - The inference process and its socket client
//! - The configuration-change coordinator, restarting the inference process
//!
//! Handlers receive the composed `CliContext`; nothing is global.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scry_core::ports::ServerLogSinkPort;
use scry_core::{
    Settings, default_settings_path, load_settings, resolve_artifact_path, validate_settings,
};
use scry_runtime::{
    ConfigCoordinator, CoordinatorConfig, EventBroadcaster, HttpLedger, ManagedProcess,
    ProcessSpec, ReadinessBarrier, ServerLogBuffer, ServiceRegistry, SocketClient,
};
use tracing::debug;

use crate::error::CliError;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Explicit settings file; must exist when set.
    pub settings_path: Option<PathBuf>,
    /// Build the configuration-change coordinator.
    pub watch_artifact: bool,
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub settings: Settings,
    pub events: EventBroadcaster,
    pub logs: Arc<ServerLogBuffer>,
    pub registry: Arc<ServiceRegistry>,
    pub inference: ManagedProcess,
    pub socket: SocketClient,
    /// `None` when disabled in settings or by `--no-watch`.
    pub coordinator: Option<Arc<ConfigCoordinator>>,
}

/// Load and validate settings from the explicit path or the default location.
pub fn load_cli_settings(config: &CliConfig) -> Result<Settings, CliError> {
    let settings = match &config.settings_path {
        Some(path) => load_settings(path, true)?,
        None => load_settings(&default_settings_path()?, false)?,
    };
    validate_settings(&settings)?;
    Ok(settings)
}

/// Wire every component. Nothing is started here.
pub fn bootstrap(settings: Settings, config: &CliConfig) -> Result<CliContext, CliError> {
    let events = EventBroadcaster::new();
    let logs = Arc::new(ServerLogBuffer::new());
    let log_sink: Arc<dyn ServerLogSinkPort> = logs.clone();

    let registry = Arc::new(ServiceRegistry::new(events.emitter(), Some(log_sink.clone())));

    let inference = ManagedProcess::new(
        ProcessSpec::inference(&settings.inference),
        events.emitter(),
        Some(log_sink),
    );

    let socket = SocketClient::new(
        settings.inference.socket_url(),
        settings.inference.reconnect_delay(),
        events.emitter(),
    );

    let coordinator = if config.watch_artifact && settings.coordinator.enabled {
        let artifact = resolve_artifact_path(&settings)?;
        debug!(artifact = %artifact.display(), "Configuring coordinator");

        let barrier = ReadinessBarrier::from_settings(
            &settings.control.url(),
            &settings.inference.socket_host,
            settings.inference.socket_port,
            &settings.coordinator,
        );
        let ledger = HttpLedger::new(
            &settings.coordinator.ledger_url,
            Duration::from_millis(settings.coordinator.ledger_timeout_ms),
        );
        Some(ConfigCoordinator::new(
            CoordinatorConfig::from_settings(artifact, &settings.coordinator),
            Arc::new(inference.clone()),
            barrier,
            Arc::new(ledger),
            events.emitter(),
        ))
    } else {
        None
    };

    Ok(CliContext {
        settings,
        events,
        logs,
        registry,
        inference,
        socket,
        coordinator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_settings_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig {
            settings_path: Some(dir.path().join("missing.json")),
            watch_artifact: false,
        };
        let err = load_cli_settings(&config).unwrap_err();
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"control":{"port":8765}}"#).unwrap();
        let config = CliConfig {
            settings_path: Some(path),
            watch_artifact: false,
        };
        let err = load_cli_settings(&config).unwrap_err();
        assert!(err.to_string().contains("8765"));
    }

    #[tokio::test]
    async fn test_bootstrap_wires_coordinator_only_when_watching() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_defaults();
        settings.coordinator.artifact_path = Some(dir.path().join("model_config.json"));

        let ctx = bootstrap(settings.clone(), &CliConfig::default()).unwrap();
        assert!(ctx.coordinator.is_none());
        assert_eq!(ctx.inference.name(), "inference");
        assert_eq!(ctx.socket.url(), "ws://127.0.0.1:8765");

        let config = CliConfig {
            settings_path: None,
            watch_artifact: true,
        };
        let ctx = bootstrap(settings, &config).unwrap();
        let coordinator = ctx.coordinator.unwrap();
        assert_eq!(coordinator.artifact(), dir.path().join("model_config.json"));
    }
}
