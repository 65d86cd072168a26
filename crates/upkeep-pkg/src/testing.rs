//! Test doubles for routine tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use upkeep_api::{ManagerResult, PackageChange};
use upkeep_exec::{CommandExecutor, CommandResult, CommandSpec, ExecError};

use crate::compat::FilterSet;
use crate::env::EnvSnapshot;
use crate::traits::{RoutineContext, StepObserver};
use crate::types::{ManagerKind, UpdateOptions};
use crate::versions::VersionTracker;

/// Executor answering from a script keyed by the rendered command line
#[derive(Default)]
pub struct ScriptedExecutor {
    script: HashMap<String, CommandResult>,
    once: Mutex<HashMap<String, VecDeque<CommandResult>>>,
    errors: HashMap<String, ExecError>,
    calls: Mutex<Vec<CommandSpec>>,
    timeouts: Mutex<HashMap<String, Duration>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, status: i32, stdout: &str) -> Self {
        self.script
            .insert(command.to_string(), CommandResult::new(status, stdout, ""));
        self
    }

    pub fn respond_err(mut self, command: &str, status: i32, stderr: &str) -> Self {
        self.script
            .insert(command.to_string(), CommandResult::new(status, "", stderr));
        self
    }

    /// Fail every call of `command` inside the executor
    pub fn error(mut self, command: &str, error: ExecError) -> Self {
        self.errors.insert(command.to_string(), error);
        self
    }

    /// Answer the next call of `command` only, before the regular script
    pub fn respond_err_once(self, command: &str, status: i32, stderr: &str) -> Self {
        self.once
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(CommandResult::new(status, "", stderr));
        self
    }

    /// Timeout the last call of `command` ran under
    pub fn timeout_for(&self, command: &str) -> Option<Duration> {
        self.timeouts.lock().unwrap().get(command).copied()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn last_env(&self, command: &str) -> Option<std::collections::BTreeMap<String, String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.to_string() == command)
            .map(|c| c.env.clone())
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.calls.lock().unwrap().push(cmd.clone());
        let line = cmd.to_string();
        if let Some(error) = self.errors.get(&line) {
            return Err(error.clone());
        }
        if let Some(result) = self
            .once
            .lock()
            .unwrap()
            .get_mut(&line)
            .and_then(VecDeque::pop_front)
        {
            return Ok(result);
        }
        Ok(self
            .script
            .get(&line)
            .cloned()
            .unwrap_or_else(|| CommandResult::new(0, "", "")))
    }

    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.timeouts.lock().unwrap().insert(cmd.to_string(), timeout);
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "scripted"
    }
}

/// Observer that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<String>,
    pub dry_runs: Vec<String>,
    pub changes: Vec<PackageChange>,
}

impl StepObserver for RecordingObserver {
    fn step_started(&mut self, manager: ManagerKind, step: &str) {
        self.events.push(format!("{manager}:{step}:started"));
    }

    fn step_completed(&mut self, manager: ManagerKind, step: &str, _packages: usize) {
        self.events.push(format!("{manager}:{step}:completed"));
    }

    fn step_failed(&mut self, manager: ManagerKind, step: &str, _error: &str) {
        self.events.push(format!("{manager}:{step}:failed"));
    }

    fn warning(&mut self, manager: ManagerKind, message: &str) {
        self.events.push(format!("{manager}:warning:{message}"));
    }

    fn would_run(&mut self, _manager: ManagerKind, command: &CommandSpec) {
        self.dry_runs.push(command.to_string());
    }

    fn package_changed(&mut self, change: &PackageChange) {
        self.changes.push(change.clone());
    }
}

/// Owned pieces a [`RoutineContext`] borrows from
pub struct Harness {
    pub kind: ManagerKind,
    pub options: UpdateOptions,
    pub filters: FilterSet,
    pub env: EnvSnapshot,
    pub observer: RecordingObserver,
    pub tracker: VersionTracker,
    pub result: ManagerResult,
}

impl Harness {
    pub fn new(kind: ManagerKind, env: EnvSnapshot) -> Self {
        Self {
            kind,
            options: UpdateOptions::default(),
            filters: FilterSet::builtin(),
            env,
            observer: RecordingObserver::default(),
            tracker: VersionTracker::new(),
            result: ManagerResult::new(kind.as_str()),
        }
    }

    pub fn context<'a>(&'a mut self, executor: &'a dyn CommandExecutor) -> RoutineContext<'a> {
        RoutineContext {
            kind: self.kind,
            executor,
            options: self.options,
            filters: &self.filters,
            env: &self.env,
            observer: &mut self.observer,
            tracker: &mut self.tracker,
            result: &mut self.result,
        }
    }
}

/// Snapshot whose PATH holds stubs for `programs`
pub fn env_with(dir: &tempfile::TempDir, os: &str, programs: &[&str]) -> EnvSnapshot {
    for program in programs {
        crate::env::testing::touch_executable(dir.path(), program);
    }
    EnvSnapshot::new(os, "x86_64").with_var("PATH", dir.path().to_string_lossy())
}
