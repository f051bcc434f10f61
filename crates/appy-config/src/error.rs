//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid config value for '{field}'{}", hint.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    InvalidValue { field: String, hint: Option<String> },

    /// Every problem found by [`crate::DevConfig::validate`], in field order.
    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// First validation message, used when only one line can be shown.
    pub fn first_message(&self) -> String {
        match self {
            ConfigError::Validation(errors) => errors.first().cloned().unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        let field = err
            .path
            .last()
            .cloned()
            .unwrap_or_else(|| "config".to_string());
        ConfigError::InvalidValue {
            field,
            hint: Some(err.kind.to_string()),
        }
    }
}
