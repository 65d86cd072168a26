//! Shared fixtures for coordinator integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kameo::actor::{ActorRef, Spawn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use upkeep_api::ProgressEvent;
use upkeep_core::config::ResourceThresholds;
use upkeep_core::resources::{NetworkProbe, Repository, ResourceManager, SystemProbe};
use upkeep_core::{EngineConfig, UpdateCoordinator, UpdateCoordinatorArgs};
use upkeep_exec::{CommandExecutor, CommandResult, CommandSpec, ExecError};
use upkeep_pkg::EnvSnapshot;

const GB: u64 = 1024 * 1024 * 1024;

/// Executor answering from a script keyed by the rendered command line
///
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct MockExecutor {
    script: HashMap<String, CommandResult>,
    cancel_after: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, status: i32, stdout: &str) -> Self {
        self.script
            .insert(command.to_string(), CommandResult::new(status, stdout, ""));
        self
    }

    pub fn fail(mut self, command: &str, stderr: &str) -> Self {
        self.script
            .insert(command.to_string(), CommandResult::new(1, "", stderr));
        self
    }

    /// Cancel `token` once `command` has run
    pub fn cancel_after(mut self, command: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((command.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        let line = cmd.to_string();
        self.calls.lock().unwrap().push(line.clone());

        if let Some((trigger, token)) = &self.cancel_after
            && *trigger == line
        {
            token.cancel();
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
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

pub struct FixedSystem {
    pub disk_gb: u64,
}

impl SystemProbe for FixedSystem {
    fn available_disk_bytes(&self, _path: &Path) -> Option<u64> {
        Some(self.disk_gb * GB)
    }

    fn available_memory_mb(&self) -> Option<u64> {
        Some(8192)
    }

    fn process_memory_mb(&self) -> Option<u64> {
        Some(48)
    }
}

pub struct FakeNetwork {
    pub online: bool,
}

#[async_trait]
impl NetworkProbe for FakeNetwork {
    async fn reachable(&self, _repository: &Repository) -> bool {
        self.online
    }
}

pub fn resources(disk_gb: u64, online: bool) -> ResourceManager {
    ResourceManager::new(
        Arc::new(FixedSystem { disk_gb }),
        Arc::new(FakeNetwork { online }),
        ResourceThresholds::default(),
        "/home/dev",
    )
}

/// Snapshot whose PATH is `dir`, holding stubs for `programs`
pub fn env_with(dir: &tempfile::TempDir, os: &str, programs: &[&str]) -> EnvSnapshot {
    for program in programs {
        let path = dir.path().join(program);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
    EnvSnapshot::new(os, "x86_64").with_var("PATH", dir.path().to_string_lossy())
}

pub struct Fixture {
    pub coordinator: ActorRef<UpdateCoordinator>,
    pub executor: Arc<MockExecutor>,
    pub events: broadcast::Receiver<ProgressEvent>,
}

pub fn spawn(
    env: EnvSnapshot,
    executor: MockExecutor,
    resources: ResourceManager,
    config: EngineConfig,
) -> Fixture {
    let (event_tx, events) = broadcast::channel(256);
    let executor = Arc::new(executor);
    let coordinator = UpdateCoordinator::spawn(UpdateCoordinatorArgs {
        config,
        executor: executor.clone(),
        env,
        resources,
        event_tx,
    });
    Fixture {
        coordinator,
        executor,
        events,
    }
}

pub fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
