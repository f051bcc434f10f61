//! Error handling for the appy CLI.
//!
//! `DevError` is the top-level error returned by commands and by the
//! orchestrator. Configuration problems convert automatically from
//! [`appy_config::ConfigError`]; the rest are raised by the individual
//! orchestrator components.

mod miette;

pub use self::miette::dev_error_to_miette;

use crate::dev::Role;
use appy_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum DevError {
    /// Configuration loading or validation failed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system or socket operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A supervised process could not be started
    #[error("Failed to start {role} process `{command}`: {source}")]
    Spawn {
        role: Role,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A restart was requested after shutdown began
    #[error("Process supervisor is shut down")]
    SupervisorClosed,

    /// Live-reload endpoint errors
    #[error("Live reload error: {0}")]
    LiveReload(String),

    /// Certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// The schema generator reported a failure
    #[error("Code generation failed: {0}")]
    Generate(String),

    /// An unrecoverable condition reported to the shutdown coordinator
    #[error("{0}")]
    Fatal(String),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Result type alias using `DevError` as the default error type.
pub type Result<T, E = DevError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`DevError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint line to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<DevError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            DevError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                DevError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: DevError = e.into();
            DevError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: DevError = e.into();
            DevError::Custom(format!("{}: {}", msg, err))
        })
    }
}
