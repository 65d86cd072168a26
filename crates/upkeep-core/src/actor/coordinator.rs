//! `UpdateCoordinator`: runs one update across the selected managers
//!
//! Managers are processed strictly one after another in worklist order.
//! The coordinator owns the run result for the whole run; routines only
//! see their own manager's result through the routine context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use upkeep_api::{ManagerResult, ProgressEvent, RunResult};
use upkeep_exec::{CommandExecutor, CommandResult, CommandSpec, ExecError};
use upkeep_pkg::{
    EnvSnapshot, ManagerKind, PackageError, RoutineContext, VersionTracker, routine,
};

use crate::config::EngineConfig;
use crate::duplicates;
use crate::error::CoreError;
use crate::message::{GetOverview, ManagerAvailability, RunUpdate, UpdateRequest};
use crate::monitor::{MonitorSummary, ResourceMonitor};
use crate::progress::ProgressTracker;
use crate::resources::ResourceManager;

/// Skip reason for managers whose executable is absent
pub const NOT_INSTALLED: &str = "not installed";

const MONITOR_CAPACITY: usize = 64;

/// Arguments for spawning an `UpdateCoordinator`
pub struct UpdateCoordinatorArgs {
    pub config: EngineConfig,
    /// Executor for every native call
    pub executor: Arc<dyn CommandExecutor>,
    /// Environment the run is evaluated against
    pub env: EnvSnapshot,
    pub resources: ResourceManager,
    /// Progress event broadcast sender
    pub event_tx: broadcast::Sender<ProgressEvent>,
}

/// Orchestrates update runs
pub struct UpdateCoordinator {
    config: EngineConfig,
    executor: Arc<dyn CommandExecutor>,
    env: EnvSnapshot,
    resources: ResourceManager,
    event_tx: broadcast::Sender<ProgressEvent>,
}

/// Refuses to start native calls once the run is cancelled
struct CancelGuard {
    inner: Arc<dyn CommandExecutor>,
    cancel: CancellationToken,
}

#[async_trait]
impl CommandExecutor for CancelGuard {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.inner.run(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.inner.run_with_timeout(cmd, timeout).await
    }

    fn executor_type(&self) -> &'static str {
        self.inner.executor_type()
    }
}

impl UpdateCoordinator {
    /// Get an event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Why `kind` would be skipped, if it would
    fn skip_reason(&self, kind: ManagerKind) -> Option<String> {
        if let Err(reason) = kind.check_support(&self.env.os) {
            return Some(reason.to_string());
        }
        (!routine(kind).is_installed(&self.env)).then(|| NOT_INSTALLED.to_string())
    }

    fn start_monitor(
        &self,
        cancel: &CancellationToken,
    ) -> Option<(CancellationToken, tokio::task::JoinHandle<MonitorSummary>)> {
        let interval = self.config.monitor_interval?;
        let stop = cancel.child_token();
        let (_sampler, rx) = ResourceMonitor::spawn(
            self.resources.system_probe(),
            interval,
            MONITOR_CAPACITY,
            stop.clone(),
        );
        Some((stop, tokio::spawn(MonitorSummary::collect(rx))))
    }

    async fn execute(&mut self, request: UpdateRequest, cancel: CancellationToken) -> RunResult {
        let mut run = RunResult::start(request.mode());
        let kinds = request.managers.kinds();
        let mut progress = ProgressTracker::new(self.event_tx.clone());
        progress.plan(&kinds);

        info!(
            run_id = %run.run_id,
            managers = kinds.len(),
            dry_run = request.dry_run,
            strategy = %request.strategy,
            compat = %request.compat,
            "update run starting"
        );
        self.emit(ProgressEvent::RunStarted {
            run_id: run.run_id.clone(),
            managers: kinds.iter().map(ToString::to_string).collect(),
            dry_run: request.dry_run,
        });

        let mut worklist = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.skip_reason(kind) {
                Some(reason) => {
                    info!(manager = %kind, reason = %reason, "skipping manager");
                    run.record_skip(kind.as_str(), &reason);
                    progress.skip_manager(kind, &reason);
                }
                None => worklist.push(kind),
            }
        }

        if worklist.is_empty() {
            progress.notice("no managers to update");
            run.finalize(Utc::now());
            return run;
        }
        if cancel.is_cancelled() {
            run.cancelled = true;
            run.finalize(Utc::now());
            return run;
        }

        let report = self.resources.check(&worklist, &BTreeMap::new()).await;
        self.emit(ProgressEvent::ResourceCheck {
            report: report.clone(),
        });
        if let Some(reason) = report.failure_reason() {
            error!(reason = %reason, "pre-flight check failed, aborting run");
            run.error = Some(CoreError::Preflight(reason).to_string());
            run.finalize(Utc::now());
            return run;
        }

        if self.config.duplicates.enabled {
            let conflicts = duplicates::detect_in(&self.env);
            if !conflicts.is_empty() {
                warn!(count = conflicts.len(), "binaries provided by several managers");
            }
            self.emit(ProgressEvent::Duplicates {
                conflicts: conflicts.clone(),
            });
            run.duplicates = conflicts;
        }

        let monitor = self.start_monitor(&cancel);
        let executor = CancelGuard {
            inner: Arc::clone(&self.executor),
            cancel: cancel.clone(),
        };
        let options = request.options();
        let mut versions = VersionTracker::new();
        let total = worklist.len();

        for (idx, kind) in worklist.into_iter().enumerate() {
            if cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }

            progress.start_manager(kind, idx + 1, total);
            let mut result = ManagerResult::new(kind.as_str());
            let outcome = {
                let mut ctx = RoutineContext {
                    kind,
                    executor: &executor,
                    options,
                    filters: &self.config.filters,
                    env: &self.env,
                    observer: &mut progress,
                    tracker: &mut versions,
                    result: &mut result,
                };
                routine(kind).run(&mut ctx).await
            };
            result.changes = versions.take(kind);

            match outcome {
                Ok(()) => {
                    progress.finish_manager(kind, result.changes.len());
                    run.managers.push(result);
                }
                Err(PackageError::Cancelled) => {
                    warn!(manager = %kind, "run cancelled");
                    run.managers.push(result);
                    run.cancelled = true;
                    break;
                }
                Err(e) if e.is_skip() => {
                    run.record_skip(kind.as_str(), NOT_INSTALLED);
                    progress.skip_manager(kind, NOT_INSTALLED);
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(manager = %kind, error = %message, "manager update failed");
                    result.fail(&message);
                    progress.fail_manager(kind, &message);
                    run.managers.push(result);
                }
            }
        }

        if let Some((stop, collector)) = monitor {
            stop.cancel();
            match collector.await {
                Ok(summary) => progress.notice(format!(
                    "resource monitor: {} samples, peak process memory {} MB, lowest available {} MB",
                    summary.samples,
                    summary.peak_process_mb.unwrap_or_default(),
                    summary.lowest_available_mb.unwrap_or_default()
                )),
                Err(e) => warn!(error = %e, "resource monitor task failed"),
            }
        }

        if run.cancelled {
            progress.notice("run cancelled");
        }
        run.finalize(Utc::now());
        info!(
            run_id = %run.run_id,
            managers = run.managers.len(),
            skipped = run.skipped.len(),
            cancelled = run.cancelled,
            "update run finished"
        );
        run
    }
}

impl Actor for UpdateCoordinator {
    type Args = UpdateCoordinatorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            id = %actor_ref.id(),
            executor = args.executor.executor_type(),
            filters = args.config.filters.len(),
            "UpdateCoordinator starting"
        );

        Ok(Self {
            config: args.config,
            executor: args.executor,
            env: args.env,
            resources: args.resources,
            event_tx: args.event_tx,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "UpdateCoordinator stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RunUpdate> for UpdateCoordinator {
    type Reply = Result<RunResult, CoreError>;

    async fn handle(
        &mut self,
        msg: RunUpdate,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.execute(msg.request, msg.cancel).await)
    }
}

impl Message<GetOverview> for UpdateCoordinator {
    type Reply = Result<Vec<ManagerAvailability>, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetOverview,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(ManagerKind::ALL
            .into_iter()
            .map(|manager| {
                let reason = self.skip_reason(manager);
                ManagerAvailability {
                    manager,
                    available: reason.is_none(),
                    reason,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use kameo::actor::Spawn;

    use super::*;
    use crate::config::ResourceThresholds;
    use crate::resources::{NetworkProbe, Repository, SystemProbe};

    struct NoExec;

    #[async_trait]
    impl CommandExecutor for NoExec {
        async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
            Err(ExecError::NotFound(cmd.program.clone()))
        }

        async fn run_with_timeout(
            &self,
            cmd: &CommandSpec,
            _timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "none"
        }
    }

    struct Roomy;

    impl SystemProbe for Roomy {
        fn available_disk_bytes(&self, _path: &Path) -> Option<u64> {
            Some(500 * 1024 * 1024 * 1024)
        }

        fn available_memory_mb(&self) -> Option<u64> {
            Some(8192)
        }

        fn process_memory_mb(&self) -> Option<u64> {
            Some(32)
        }
    }

    struct Online;

    #[async_trait]
    impl NetworkProbe for Online {
        async fn reachable(&self, _repository: &Repository) -> bool {
            true
        }
    }

    fn args(env: EnvSnapshot) -> UpdateCoordinatorArgs {
        let (event_tx, _) = broadcast::channel(64);
        UpdateCoordinatorArgs {
            config: EngineConfig::default(),
            executor: Arc::new(NoExec),
            env,
            resources: ResourceManager::new(
                Arc::new(Roomy),
                Arc::new(Online),
                ResourceThresholds::default(),
                "/",
            ),
            event_tx,
        }
    }

    #[tokio::test]
    async fn test_overview_reports_unsupported_and_missing() {
        let coordinator = UpdateCoordinator::spawn(args(EnvSnapshot::new("macos", "aarch64")));

        let overview = coordinator.ask(GetOverview).await.unwrap();

        assert_eq!(overview.len(), ManagerKind::ALL.len());
        let apt = overview.iter().find(|a| a.manager == ManagerKind::Apt).unwrap();
        assert_eq!(apt.reason.as_deref(), Some("apt is Linux only"));
        let brew = overview.iter().find(|a| a.manager == ManagerKind::Brew).unwrap();
        assert_eq!(brew.reason.as_deref(), Some(NOT_INSTALLED));
        assert!(overview.iter().all(|a| !a.available));

        coordinator.stop_gracefully().await.unwrap();
    }

    #[tokio::test]
    async fn test_nothing_installed_skips_everything() {
        let coordinator = UpdateCoordinator::spawn(args(EnvSnapshot::new("linux", "x86_64")));

        let run = coordinator
            .ask(RunUpdate {
                request: UpdateRequest::default(),
                cancel: CancellationToken::new(),
            })
            .await
            .unwrap();

        assert!(run.managers.is_empty());
        assert_eq!(run.skipped.len(), ManagerKind::ALL.len());
        assert_eq!(run.totals.skip, 8);
        assert_eq!(run.exit_code(), 0);

        coordinator.stop_gracefully().await.unwrap();
    }
}
