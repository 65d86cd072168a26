//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::command::CommandSpec;
use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs native commands on behalf of the update routines
///
/// A non-zero exit status is returned as `Ok`; callers decide what a
/// failure means for their step.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with `ExecError::Timeout` past the deadline
    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Executor kind, for logging
    fn executor_type(&self) -> &'static str;
}
