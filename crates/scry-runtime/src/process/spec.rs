//! Launch and supervision parameters for one managed process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scry_core::ports::ReadinessProbe;
use scry_core::{
    InferenceSettings, RetryPolicy, ServiceConfig, ServiceSettings, script_working_dir,
};

use crate::health::{HttpProbe, TcpProbe};

/// Everything a [`ManagedProcess`](super::ManagedProcess) needs to spawn,
/// probe and restart its child.
#[derive(Clone)]
pub struct ProcessSpec {
    /// Name used in logs and events.
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Polled during startup; also used by the periodic health poll.
    pub readiness: Arc<dyn ReadinessProbe>,
    pub readiness_interval: Duration,
    pub startup_timeout: Duration,
    pub restart_policy: RetryPolicy,
    /// A run that lasts this long before crashing clears the crash count.
    pub stability_window: Duration,
    pub shutdown_grace: Duration,
    /// Pause between stop and start on a manual restart.
    pub settle_delay: Duration,
    /// Refuse to spawn if this `host:port` is already bound.
    pub exclusive_port: Option<(String, u16)>,
    /// Log-only health poll while running.
    pub health_poll: Option<Duration>,
    /// Re-emit stderr lines as prompt-less `error` events.
    pub forward_stderr: bool,
}

impl ProcessSpec {
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
        readiness: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            readiness,
            readiness_interval: Duration::from_millis(500),
            startup_timeout: Duration::from_secs(15),
            restart_policy: RetryPolicy::linear(3, Duration::from_secs(3)),
            stability_window: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            exclusive_port: None,
            health_poll: None,
            forward_stderr: false,
        }
    }

    /// Inference process: TCP readiness on the socket port.
    pub fn inference(settings: &InferenceSettings) -> Self {
        let probe = TcpProbe::new(settings.socket_host.clone(), settings.socket_port)
            .with_connect_timeout(Duration::from_millis(settings.readiness_interval_ms.max(100)));

        let mut spec = Self::new("inference", &settings.executable, Arc::new(probe))
            .with_args(settings.args.iter().cloned())
            .with_env("PYTHONUNBUFFERED", "1");
        // the server script resolves its siblings relative to its own directory
        spec.working_dir = settings
            .working_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| script_working_dir(&settings.args, Path::new(&settings.executable)));
        spec.readiness_interval = Duration::from_millis(settings.readiness_interval_ms);
        spec.startup_timeout = Duration::from_millis(settings.startup_timeout_ms);
        spec.restart_policy = settings.restart_policy();
        spec.stability_window = Duration::from_millis(settings.stability_window_ms);
        spec.shutdown_grace = Duration::from_millis(settings.shutdown_grace_ms);
        spec.settle_delay = Duration::from_millis(settings.settle_delay_ms);
        spec.forward_stderr = settings.forward_stderr;
        spec
    }

    /// Registry service: HTTP readiness, exclusive port, periodic poll.
    pub fn service(id: &str, config: &ServiceConfig, settings: &ServiceSettings) -> Self {
        let probe = HttpProbe::new(config.health_url()).expect_status_ok();
        let mut spec = Self::new(id, &config.executable, Arc::new(probe))
            .with_args(config.args.iter().cloned())
            .with_env("PYTHONUNBUFFERED", "1");
        spec.working_dir = config.resolved_working_dir();
        spec.readiness_interval = Duration::from_millis(settings.readiness_interval_ms);
        spec.startup_timeout = Duration::from_millis(settings.startup_timeout_ms);
        spec.restart_policy = settings.restart_policy();
        spec.stability_window = Duration::from_millis(settings.stability_window_ms);
        spec.shutdown_grace = Duration::from_millis(settings.shutdown_grace_ms);
        spec.settle_delay = Duration::from_millis(settings.settle_delay_ms);
        spec.exclusive_port = Some((config.host.clone(), config.port));
        spec.health_poll = Some(Duration::from_millis(settings.health_poll_interval_ms));
        spec
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_startup(mut self, timeout: Duration, interval: Duration) -> Self {
        self.startup_timeout = timeout;
        self.readiness_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_restart_policy(mut self, policy: RetryPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_stability_window(mut self, window: Duration) -> Self {
        self.stability_window = window;
        self
    }

    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn with_exclusive_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.exclusive_port = Some((host.into(), port));
        self
    }

    #[must_use]
    pub const fn with_health_poll(mut self, interval: Duration) -> Self {
        self.health_poll = Some(interval);
        self
    }

    #[must_use]
    pub const fn forward_stderr(mut self, forward: bool) -> Self {
        self.forward_stderr = forward;
        self
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("name", &self.name)
            .field("executable", &self.executable)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("readiness", &self.readiness.describe())
            .field("startup_timeout", &self.startup_timeout)
            .field("restart_policy", &self.restart_policy)
            .field("exclusive_port", &self.exclusive_port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_spec_uses_socket_probe_and_linear_backoff() {
        let settings = InferenceSettings::default();
        let spec = ProcessSpec::inference(&settings);
        assert_eq!(spec.readiness.describe(), "tcp://127.0.0.1:8765");
        assert_eq!(spec.restart_policy, RetryPolicy::linear(3, Duration::from_secs(3)));
        assert!(spec.exclusive_port.is_none());
        assert!(spec.forward_stderr);
    }

    #[test]
    fn inference_runs_in_the_script_directory() {
        let settings = InferenceSettings {
            args: vec!["-u".to_string(), "/opt/scry/llama_server.py".to_string()],
            ..InferenceSettings::default()
        };
        let spec = ProcessSpec::inference(&settings);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/opt/scry")));

        let pinned = InferenceSettings {
            working_dir: Some("/var/lib/scry".to_string()),
            ..settings
        };
        assert_eq!(
            ProcessSpec::inference(&pinned).working_dir,
            Some(PathBuf::from("/var/lib/scry"))
        );
    }

    #[test]
    fn service_spec_guards_its_port() {
        let settings = ServiceSettings::transfer();
        let config = settings.service_config();
        let spec = ProcessSpec::service("transfer", &config, &settings);
        assert_eq!(spec.exclusive_port, Some(("127.0.0.1".to_string(), 8080)));
        assert_eq!(spec.readiness.describe(), "http://127.0.0.1:8080/health");
        assert_eq!(spec.health_poll, Some(Duration::from_secs(30)));
        assert_eq!(spec.startup_timeout, Duration::from_secs(90));
    }
}
