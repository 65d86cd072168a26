//! Error types for upkeep-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running a native command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Program not found on the search path
    #[error("program not found: {0}")]
    NotFound(String),

    /// Command execution failed
    #[error("command execution failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Run was cancelled before or during the command
    #[error("cancelled")]
    Cancelled,

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}
