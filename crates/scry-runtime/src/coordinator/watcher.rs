//! File-system watch on the configuration artifact.
//!
//! The parent directory is watched rather than the file itself so that
//! writers replacing the file by rename are still seen. Events for other
//! files in the directory are filtered out. When no native watcher is
//! available a polling watcher takes over.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use scry_core::{CoordinatorError, ensure_directory};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps the underlying watcher alive; dropping it stops the watch.
pub enum ArtifactWatcher {
    Native(RecommendedWatcher),
    Polling(PollWatcher),
}

impl ArtifactWatcher {
    pub const fn is_polling(&self) -> bool {
        matches!(self, Self::Polling(_))
    }
}

/// Start watching `artifact`. Every relevant raw event sends one signal.
pub fn watch_artifact(
    artifact: &Path,
    signals: mpsc::UnboundedSender<()>,
) -> Result<ArtifactWatcher, CoordinatorError> {
    let dir = artifact
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = artifact
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| CoordinatorError::Watch(format!("{} has no file name", artifact.display())))?;

    ensure_directory(&dir).map_err(|e| CoordinatorError::Watch(e.to_string()))?;

    match notify::recommended_watcher(handler(file_name.clone(), signals.clone())) {
        Ok(mut watcher) => match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = %dir.display(), "Watching configuration artifact");
                return Ok(ArtifactWatcher::Native(watcher));
            }
            Err(e) => warn!(error = %e, "Native watch failed, falling back to polling"),
        },
        Err(e) => warn!(error = %e, "Native watcher unavailable, falling back to polling"),
    }

    let config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
    let mut watcher = PollWatcher::new(handler(file_name, signals), config)
        .map_err(|e| CoordinatorError::Watch(e.to_string()))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| CoordinatorError::Watch(e.to_string()))?;
    debug!(dir = %dir.display(), interval = ?POLL_INTERVAL, "Polling configuration artifact");
    Ok(ArtifactWatcher::Polling(watcher))
}

fn handler(
    file_name: OsString,
    signals: mpsc::UnboundedSender<()>,
) -> impl Fn(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            ) {
                return;
            }
            let ours = event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()));
            if ours && signals.send(()).is_err() {
                debug!("Coordinator gone, dropping watch event");
            }
        }
        Err(e) => warn!(error = %e, "Configuration watch error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_to_the_artifact_are_signalled() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("model_config.json");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _watcher = watch_artifact(&artifact, tx).unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        std::fs::write(&artifact, r#"{"model_name":"A"}"#).unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(signal.unwrap(), Some(()));
    }

    #[test]
    fn missing_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("nested").join("model_config.json");
        let (tx, _rx) = mpsc::unbounded_channel();

        let _watcher = watch_artifact(&artifact, tx).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
