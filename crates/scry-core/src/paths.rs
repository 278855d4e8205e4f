//! Platform paths for settings and the configuration artifact.
//!
//! Resolution order for the settings file:
//! 1. Explicit path (CLI flag or `SCRY_SETTINGS`)
//! 2. `<config dir>/scry/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::settings::{Settings, SettingsError};

/// Directory name under the platform config dir.
pub const APP_DIR_NAME: &str = "scry";

/// File name of the settings document.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// File name of the configuration artifact the model selector writes.
pub const ARTIFACT_FILE_NAME: &str = "model_config.json";

/// Errors from path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Cannot determine the platform config directory")]
    NoConfigDir,

    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// `<platform config dir>/scry`.
pub fn config_root() -> Result<PathBuf, PathError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(PathError::NoConfigDir)
}

/// Default location of the settings file.
pub fn default_settings_path() -> Result<PathBuf, PathError> {
    Ok(config_root()?.join(SETTINGS_FILE_NAME))
}

/// Default location of the configuration artifact.
pub fn default_artifact_path() -> Result<PathBuf, PathError> {
    Ok(config_root()?.join(ARTIFACT_FILE_NAME))
}

/// Effective artifact path: the configured one, else the default.
pub fn resolve_artifact_path(settings: &Settings) -> Result<PathBuf, PathError> {
    match &settings.coordinator.artifact_path {
        Some(path) => Ok(path.clone()),
        None => default_artifact_path(),
    }
}

/// Create a directory (and parents) if missing.
pub fn ensure_directory(path: &Path) -> Result<(), PathError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load settings from `path`.
///
/// A missing file yields defaults only when `required` is false; an explicit
/// path that does not exist is an error.
pub fn load_settings(path: &Path, required: bool) -> Result<Settings, SettingsError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            debug!(path = %path.display(), "Loaded settings file");
            Settings::from_json(&contents)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "No settings file, using defaults");
            Ok(Settings::with_defaults())
        }
        Err(e) => Err(SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}
