//! Update routine trait and the context routines run in

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use upkeep_api::{CompatMode, ManagerResult, PackageChange, PluginResult};
use upkeep_exec::{CommandExecutor, CommandResult, CommandSpec};

use crate::compat::{FilterSet, PostAction};
use crate::env::EnvSnapshot;
use crate::error::PackageError;
use crate::types::{ManagerKind, UpdateOptions};
use crate::versions::VersionTracker;

/// Upper bound for read-only queries such as outdated listings
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default wait before a step blocked by a package database lock is retried
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Receives step-level progress from a running routine
///
/// Observers never influence control flow.
pub trait StepObserver: Send + Sync {
    fn step_started(&mut self, manager: ManagerKind, step: &str);
    fn step_completed(&mut self, manager: ManagerKind, step: &str, packages: usize);
    fn step_failed(&mut self, manager: ManagerKind, step: &str, error: &str);
    fn warning(&mut self, manager: ManagerKind, message: &str);
    fn would_run(&mut self, manager: ManagerKind, command: &CommandSpec);
    fn package_changed(&mut self, change: &PackageChange);
}

/// One manager's dedicated update routine
#[async_trait]
pub trait UpdateRoutine: Send + Sync {
    /// Manager this routine drives
    fn kind(&self) -> ManagerKind;

    /// Whether the manager is present in the environment
    fn is_installed(&self, env: &EnvSnapshot) -> bool {
        env.has_executable(self.kind().as_str())
    }

    /// Run the routine, recording into `ctx.result`
    ///
    /// # Errors
    /// `ManagerNotFound` when the executable is missing, `Cancelled` when
    /// the run was stopped, and any step failure the routine cannot
    /// recover from.
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError>;
}

/// What the filter chain contributes to one sub-unit
#[derive(Debug, Clone, Default)]
pub struct Screened {
    /// Merged environment for the sub-unit's native commands
    pub env: BTreeMap<String, String>,
    /// Post actions, in filter order
    pub post: Vec<PostAction>,
}

/// Everything a routine may touch during one manager's update
pub struct RoutineContext<'a> {
    pub kind: ManagerKind,
    pub executor: &'a dyn CommandExecutor,
    pub options: UpdateOptions,
    pub filters: &'a FilterSet,
    pub env: &'a EnvSnapshot,
    pub observer: &'a mut dyn StepObserver,
    pub tracker: &'a mut VersionTracker,
    pub result: &'a mut ManagerResult,
}

impl RoutineContext<'_> {
    /// Fail with `ManagerNotFound` unless `program` is on the search path
    ///
    /// # Errors
    /// Returns `PackageError::ManagerNotFound`
    pub fn require(&self, program: &str) -> Result<(), PackageError> {
        if self.env.has_executable(program) {
            Ok(())
        } else {
            Err(PackageError::ManagerNotFound(self.kind.to_string()))
        }
    }

    /// Whether mutating steps are only previewed
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Empty unit of work named after the manager
    #[must_use]
    pub fn manager_unit(&self) -> PluginResult {
        PluginResult::new(self.kind.as_str())
    }

    /// Run a read-only query; executed in dry-run mode too
    ///
    /// Queries are bounded by [`QUERY_TIMEOUT`].
    ///
    /// # Errors
    /// Returns executor failures and timeouts; a non-zero exit is not an
    /// error here
    pub async fn query(&self, cmd: &CommandSpec) -> Result<CommandResult, PackageError> {
        debug!(manager = %self.kind, command = %cmd, "query");
        Ok(self.executor.run_with_timeout(cmd, QUERY_TIMEOUT).await?)
    }

    async fn execute(&self, cmd: &CommandSpec) -> Result<CommandResult, PackageError> {
        match self.executor.run(cmd).await {
            Ok(result) if result.success() => Ok(result),
            Ok(result) => Err(PackageError::from_step(
                cmd.to_string(),
                &result.stderr,
                result.failure_summary(),
            )),
            Err(e) => Err(PackageError::from(e)),
        }
    }

    /// Run a mutating native step with progress reporting
    ///
    /// In dry-run mode nothing is executed: the command is reported to the
    /// observer and `would:<tag>` is recorded on `unit`. Otherwise the tag
    /// is recorded once the command succeeded. A step blocked by a package
    /// database lock is retried once after `lock_retry_delay`.
    ///
    /// # Errors
    /// Returns executor failures and non-zero exits, classified by stderr
    pub async fn step(
        &mut self,
        unit: &mut PluginResult,
        step: &str,
        tag: &str,
        cmd: CommandSpec,
    ) -> Result<Option<CommandResult>, PackageError> {
        self.observer.step_started(self.kind, step);

        if self.options.dry_run {
            self.observer.would_run(self.kind, &cmd);
            unit.push_action_for(tag, true);
            self.observer.step_completed(self.kind, step, 0);
            return Ok(None);
        }

        let mut outcome = self.execute(&cmd).await;
        if outcome.as_ref().is_err_and(PackageError::is_retryable) {
            warn!(manager = %self.kind, command = %cmd, "package database locked, retrying once");
            tokio::time::sleep(self.options.lock_retry_delay).await;
            outcome = self.execute(&cmd).await;
        }

        match outcome {
            Ok(result) => {
                unit.push_action(tag);
                self.observer.step_completed(self.kind, step, 0);
                Ok(Some(result))
            }
            Err(e) => {
                self.observer.step_failed(self.kind, step, &e.to_string());
                if e.needs_sudo() {
                    self.warn(
                        unit,
                        format!("{step} needs sudo; run `sudo -v` before upkeep to cache credentials"),
                    );
                }
                Err(e)
            }
        }
    }

    /// Downgrade a step failure to a warning on `unit`
    ///
    /// Cancellation still propagates.
    ///
    /// # Errors
    /// Returns `PackageError::Cancelled` only
    pub fn tolerate<T>(
        &mut self,
        unit: &mut PluginResult,
        outcome: Result<T, PackageError>,
    ) -> Result<Option<T>, PackageError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(PackageError::Cancelled) => Err(PackageError::Cancelled),
            Err(e) => {
                self.warn(unit, e.to_string());
                Ok(None)
            }
        }
    }

    /// Run `unit` through the compatibility filter chain
    ///
    /// Warnings are recorded, the conflict count and applied environment
    /// are stored on `unit`. Conflicts only warn unless the mode is strict.
    ///
    /// # Errors
    /// Returns `PackageError::StrictConflict` in strict mode when any
    /// conflict filter applies
    pub fn screen(&mut self, unit: &mut PluginResult) -> Result<Screened, PackageError> {
        let filters = self.filters;
        let chain = filters.chain(self.kind.as_str(), &unit.name, self.options.compat, self.env);

        for warning in chain.warnings() {
            self.warn(unit, warning);
        }

        unit.conflicts = chain.conflict_count();
        if unit.conflicts > 0 {
            if self.options.compat == CompatMode::Strict {
                return Err(PackageError::StrictConflict {
                    manager: self.kind.to_string(),
                    plugin: unit.name.clone(),
                });
            }
            let message = format!(
                "{} compatibility conflict(s) detected for {} plugin {}",
                unit.conflicts, self.kind, unit.name
            );
            self.warn(unit, message);
        }

        let env = chain.merged_env();
        unit.env_applied.clone_from(&env);
        Ok(Screened {
            env,
            post: chain.post_actions().into_iter().cloned().collect(),
        })
    }

    /// Run post actions for `unit` under the `post_actions` step
    ///
    /// Failures are warnings; actions marked `ignore_error` fail silently.
    ///
    /// # Errors
    /// Returns `PackageError::Cancelled` only
    pub async fn post_actions(
        &mut self,
        unit: &mut PluginResult,
        actions: &[PostAction],
    ) -> Result<(), PackageError> {
        for action in actions {
            let Some((program, args)) = action.command.split_first() else {
                continue;
            };
            let cmd = CommandSpec::new(program).args(args).envs(&action.env);
            let tag = format!("post:{}", action.description);

            match self.step(unit, "post_actions", &tag, cmd).await {
                Ok(_) => {}
                Err(PackageError::Cancelled) => return Err(PackageError::Cancelled),
                Err(e) if action.ignore_error => {
                    debug!(action = %action.description, error = %e, "post action failed");
                }
                Err(e) => {
                    self.warn(unit, format!("post action failed ({}): {e}", action.description));
                }
            }
        }
        Ok(())
    }

    /// Record a warning on `unit` and report it
    pub fn warn(&mut self, unit: &mut PluginResult, message: impl Into<String>) {
        let message = message.into();
        warn!(manager = %self.kind, unit = %unit.name, "{message}");
        self.observer.warning(self.kind, &message);
        unit.warnings.push(message);
    }

    /// Report progress on a step that is not a single native command
    pub fn start_step(&mut self, step: &str) {
        self.observer.step_started(self.kind, step);
    }

    /// Complete a step started with [`Self::start_step`]
    pub fn complete_step(&mut self, step: &str, packages: usize) {
        self.observer.step_completed(self.kind, step, packages);
    }

    /// Fail a step started with [`Self::start_step`]
    pub fn fail_step(&mut self, step: &str, error: &str) {
        self.observer.step_failed(self.kind, step, error);
    }

    /// Record a detected version change
    pub fn record_change(&mut self, change: PackageChange) {
        self.observer.package_changed(&change);
        self.tracker.record(self.kind, change);
    }

    /// Store a finished unit, attaching a routine error to it
    ///
    /// # Errors
    /// Returns `outcome`'s error after recording it
    pub fn finish_unit(
        &mut self,
        mut unit: PluginResult,
        outcome: Result<(), PackageError>,
    ) -> Result<(), PackageError> {
        if let Err(e) = &outcome
            && !matches!(e, PackageError::Cancelled)
        {
            unit.error = Some(e.to_string());
        }
        self.result.add_plugin(unit);
        outcome
    }
}
