//! HTTP-backed services held in the service registry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::process::{ProcessInfo, ProcessState};

/// Launch and probe configuration for one registry service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Executable to spawn (an interpreter, or the service binary itself).
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the parent directory of the first path-like argument,
    /// or of the executable.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceConfig {
    pub fn new(host: impl Into<String>, port: u16, executable: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            health_path: default_health_path(),
        }
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
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Base URL, e.g. `http://127.0.0.1:8080`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        let path = if self.health_path.starts_with('/') {
            self.health_path.clone()
        } else {
            format!("/{}", self.health_path)
        };
        format!("{}{}", self.url(), path)
    }

    /// Working directory the child is launched in: explicit, else the
    /// directory of the script argument, else the executable's directory.
    #[must_use]
    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.working_dir {
            return Some(dir.clone());
        }
        script_working_dir(&self.args, &self.executable)
    }
}

/// Parent directory of the first script argument (a `.py` path or an
/// existing file), else of the executable. `None` for bare names.
#[must_use]
pub fn script_working_dir(args: &[String], executable: &Path) -> Option<PathBuf> {
    args.iter()
        .map(Path::new)
        .find(|p| p.extension().is_some_and(|ext| ext == "py") || p.is_file())
        .unwrap_or(executable)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Coarse service status as the registry reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Running,
    /// Between a crash and the next automatic start.
    Error,
    /// Restart budget exhausted.
    Failed,
}

impl From<ProcessState> for ServiceStatus {
    fn from(state: ProcessState) -> Self {
        match state {
            ProcessState::Stopped => Self::Stopped,
            ProcessState::Starting | ProcessState::Running => Self::Running,
            ProcessState::Crashed | ProcessState::Restarting => Self::Error,
            ProcessState::Failed => Self::Failed,
        }
    }
}

/// Answer to a registry status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReport {
    pub id: String,
    pub status: ServiceStatus,
    pub running: bool,
    pub url: String,
    pub host: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub retry_count: u32,
    /// Result of a live probe taken while building this report.
    pub healthy: bool,
}

impl ServiceReport {
    /// Combine a process snapshot with a fresh probe result.
    #[must_use]
    pub fn from_info(id: &str, config: &ServiceConfig, info: &ProcessInfo, healthy: bool) -> Self {
        Self {
            id: id.to_string(),
            status: info.state.into(),
            running: info.is_running(),
            url: config.url(),
            host: config.host.clone(),
            port: config.port,
            pid: info.pid,
            uptime_secs: info.uptime_secs(),
            retry_count: info.restart_count,
            healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_normalizes_path() {
        let mut cfg = ServiceConfig::new("127.0.0.1", 8080, "/usr/bin/python3");
        assert_eq!(cfg.health_url(), "http://127.0.0.1:8080/health");
        cfg.health_path = "status".to_string();
        assert_eq!(cfg.health_url(), "http://127.0.0.1:8080/status");
    }

    #[test]
    fn working_dir_prefers_script_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("server.py");
        std::fs::write(&script, "print('hi')").unwrap();

        let cfg = ServiceConfig::new("127.0.0.1", 8080, "/usr/bin/python3")
            .with_args(["-u".to_string(), script.display().to_string()]);
        assert_eq!(cfg.resolved_working_dir().as_deref(), Some(dir.path()));

        let explicit = cfg.clone().with_working_dir("/tmp");
        assert_eq!(
            explicit.resolved_working_dir(),
            Some(PathBuf::from("/tmp"))
        );
    }

    #[test]
    fn working_dir_falls_back_to_executable_parent() {
        let cfg = ServiceConfig::new("127.0.0.1", 8080, "/usr/bin/python3");
        assert_eq!(cfg.resolved_working_dir(), Some(PathBuf::from("/usr/bin")));
    }

    #[test]
    fn script_directory_wins_even_before_the_file_exists() {
        let args = vec!["-u".to_string(), "/srv/scry/llama_server.py".to_string()];
        assert_eq!(
            script_working_dir(&args, Path::new("python3")),
            Some(PathBuf::from("/srv/scry"))
        );
    }

    #[test]
    fn bare_names_have_no_working_dir() {
        let args = vec!["-u".to_string(), "llama_server.py".to_string()];
        assert_eq!(script_working_dir(&args, Path::new("python3")), None);
    }

    #[test]
    fn status_maps_from_process_state() {
        assert_eq!(
            ServiceStatus::from(ProcessState::Restarting),
            ServiceStatus::Error
        );
        assert_eq!(
            ServiceStatus::from(ProcessState::Failed),
            ServiceStatus::Failed
        );
        assert_eq!(
            ServiceStatus::from(ProcessState::Starting),
            ServiceStatus::Running
        );
    }
}
