//! Error types for upkeep-pkg

use thiserror::Error;
use upkeep_exec::ExecError;

/// Errors that can occur during a manager's update routine
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// Package manager not found on system
    #[error("{0} is not installed or not in PATH")]
    ManagerNotFound(String),

    /// Manager name outside the supported set
    #[error("unsupported package manager: {0}")]
    UnknownManager(String),

    /// Lock file conflict (another process running)
    #[error("lock file conflict: {0}")]
    LockConflict(String),

    /// Insufficient permissions (need sudo)
    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),

    /// Command execution failed
    #[error("{step} failed: {message}")]
    CommandFailed {
        /// Step that failed
        step: String,
        /// Error message
        message: String,
    },

    /// Failed to parse command output
    #[error("parse error: {0}")]
    ParseError(String),

    /// Execution error from the command executor
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Strict compatibility mode found conflicts
    #[error("compatibility conflicts detected for {manager} plugin {plugin} (mode=strict)")]
    StrictConflict {
        /// Manager being updated
        manager: String,
        /// Sub-unit with conflicts
        plugin: String,
    },

    /// Run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Invalid filter configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl PackageError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PackageError::LockConflict(_))
    }

    /// Check if error indicates need for sudo
    #[must_use]
    pub fn needs_sudo(&self) -> bool {
        matches!(self, PackageError::PermissionDenied(_))
    }

    /// Whether the manager should be recorded as skipped rather than failed
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, PackageError::ManagerNotFound(_))
    }

    /// Classify a failed native step from its stderr
    pub fn from_step(step: impl Into<String>, stderr: &str, summary: String) -> Self {
        if stderr.contains("Could not get lock") || stderr.contains("unable to lock database") {
            PackageError::LockConflict(summary)
        } else if stderr.contains("Permission denied") || stderr.contains("a password is required")
        {
            PackageError::PermissionDenied(summary)
        } else {
            PackageError::CommandFailed {
                step: step.into(),
                message: summary,
            }
        }
    }
}

impl From<ExecError> for PackageError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled => PackageError::Cancelled,
            other => PackageError::ExecutionError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_step_classifies_lock() {
        let err = PackageError::from_step(
            "sudo apt update",
            "E: Could not get lock /var/lib/apt/lists/lock",
            "exit status 100".to_string(),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_exec_cancel_maps_to_cancelled() {
        let err: PackageError = ExecError::Cancelled.into();
        assert!(matches!(err, PackageError::Cancelled));
    }
}
