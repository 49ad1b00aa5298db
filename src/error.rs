//! Error handling for botctl.
use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Defines all possible errors that can occur while supervising the bot process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Error loading or validating the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error for the PID file.
    #[error("PID file error: {0}")]
    PidFile(#[from] PidFileError),

    /// Error reading the log stream.
    #[error("Logs error: {0}")]
    Logs(#[from] LogsError),

    /// Error producing a backup archive.
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// Error spawning the supervised process.
    #[error("Failed to start '{command}': {source}")]
    Launch {
        /// The command line that failed to launch.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The dependency installation step of `update` failed.
    #[error("Dependency installation `{command}` failed ({status}); not restarting")]
    DependencyInstall {
        /// The install command that was executed.
        command: String,
        /// Exit status reported by the install command.
        status: ExitStatus,
    },

    /// The dependency installation step could not be executed at all.
    #[error("Failed to run dependency installation `{command}`: {source}")]
    DependencyInstallSpawn {
        /// The install command that was attempted.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error acquiring the advisory lock guarding the PID file.
    #[error("Failed to lock {path:?}: {source}")]
    Lock {
        /// Path of the lock file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading a configuration or env file.
    #[error("Failed to read {path:?}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference names a variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration field could not be parsed.
    #[error("Invalid duration '{0}' (expected <number>[ms|s|m|h])")]
    InvalidDuration(String),

    /// A field holds a value that cannot be used.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending key.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Error type for PID file operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Error reading or writing the PID file.
    #[error("Failed to access PID file: {0}")]
    Io(#[from] std::io::Error),

    /// The PID file exists but does not hold a usable process identifier.
    #[error("PID file {path:?} holds an invalid process id: {content:?}")]
    Invalid {
        /// Location of the PID file.
        path: PathBuf,
        /// The raw (trimmed) file content.
        content: String,
    },
}

/// Error type for log snapshot operations.
#[derive(Debug, Error)]
pub enum LogsError {
    /// Error reading the log file.
    #[error("Failed to read log file {path:?}: {source}")]
    Read {
        /// Location of the log file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },
}

/// Error type for backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The base directory to archive does not exist.
    #[error("Base directory {0:?} does not exist")]
    MissingBaseDir(PathBuf),

    /// An archive with the same name (same second) is already present.
    #[error("Archive {0:?} already exists")]
    AlreadyExists(PathBuf),

    /// Error walking the base directory.
    #[error("Failed to walk {path:?}: {source}")]
    Walk {
        /// Directory being traversed.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// Error writing the archive.
    #[error("Failed to write archive {path:?}: {source}")]
    Write {
        /// Archive location.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },
}
