//! Runtime error types.

use thiserror::Error;

use spindle_framework::deploy::DeployError;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A configured scheduler could not start its workers.
    #[error("Failed to start scheduler '{name}': {source}")]
    SchedulerStart {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Routes, schedulers or resolvers failed validation.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// Installing the shutdown signal handler failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
