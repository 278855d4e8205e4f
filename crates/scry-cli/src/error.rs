//! CLI-specific error types and exit-code mapping.

use scry_core::{CoreError, PathError, SettingsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Core domain error.
    #[error("{0}")]
    Core(String),

    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A supervised process could not be started or stopped.
    #[error("Process error: {0}")]
    Process(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Process(_) => 71,  // EX_OSERR
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Supervisor(e) => Self::Process(e.to_string()),
            CoreError::Registry(e) => Self::Process(e.to_string()),
            CoreError::Settings(e) => Self::Config(e.to_string()),
            CoreError::Path(e) => Self::Config(e.to_string()),
            CoreError::Validation(msg) => Self::Arguments(msg),
            e @ (CoreError::Socket(_) | CoreError::Coordinator(_)) => Self::Core(e.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::SupervisorError;

    #[test]
    fn test_exit_codes() {
        let err: CliError = SettingsError::InvalidPort(80).into();
        assert_eq!(err.exit_code(), 78);

        let err: CliError = CoreError::from(SupervisorError::PortInUse(8001)).into();
        assert_eq!(err.exit_code(), 71);
        assert_eq!(err.to_string(), "Process error: Port 8001 is already in use");

        let err: CliError = CoreError::Validation("empty".to_string()).into();
        assert_eq!(err.exit_code(), 2);
    }
}
