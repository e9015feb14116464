//! Errors raised while loading configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("Unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// Merging or deserializing the sources failed.
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value failed validation.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// Two schedulers share a name.
    #[error("Duplicate scheduler name: {0}")]
    DuplicateScheduler(String),

    /// The default scheduler is not configured.
    #[error("Default scheduler '{0}' is not configured")]
    UnknownScheduler(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
