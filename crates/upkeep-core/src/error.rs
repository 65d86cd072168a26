//! Core error types for upkeep-core

use thiserror::Error;
use upkeep_pkg::PackageError;

/// Errors that can occur in engine operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Invalid engine configuration or filter overlay
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid manager selection
    #[error("invalid manager selection: {0}")]
    InvalidSelection(String),

    /// Pre-flight resource check refused the run
    #[error("pre-flight check failed: {0}")]
    Preflight(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl From<PackageError> for CoreError {
    fn from(err: PackageError) -> Self {
        match err {
            PackageError::UnknownManager(_) => CoreError::InvalidSelection(err.to_string()),
            PackageError::ConfigError(msg) => CoreError::ConfigError(msg),
            other => CoreError::ConfigError(other.to_string()),
        }
    }
}
