//! Progress tracking
//!
//! Keeps per-manager and per-step state for the current run and turns
//! every transition into a [`ProgressEvent`]. The tracker only observes;
//! nothing it records feeds back into control flow.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use upkeep_api::{PackageChange, ProgressEvent};
use upkeep_exec::CommandSpec;
use upkeep_pkg::{ManagerKind, StepObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

/// One step of a manager's routine
#[derive(Debug, Clone)]
pub struct StepProgress {
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Packages affected, as reported by the routine
    pub packages: usize,
    clock: Option<Instant>,
}

impl StepProgress {
    fn pending(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            packages: 0,
            clock: None,
        }
    }

    fn activate(&mut self) {
        self.status = StepStatus::Active;
        self.started_at = Some(Utc::now());
        self.clock = Some(Instant::now());
    }

    fn finish(&mut self, status: StepStatus) -> Duration {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.clock.map(|c| c.elapsed()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Pending,
    Active,
    Completed,
    Skipped,
    Failed,
}

/// Progress of one manager
#[derive(Debug, Clone)]
pub struct ManagerProgress {
    pub kind: ManagerKind,
    pub state: ManagerState,
    /// Empty until the manager starts; skipped managers never get steps
    pub steps: Vec<StepProgress>,
    pub skip_reason: Option<String>,
    pub duration: Option<Duration>,
    clock: Option<Instant>,
}

impl ManagerProgress {
    fn new(kind: ManagerKind) -> Self {
        Self {
            kind,
            state: ManagerState::Pending,
            steps: Vec::new(),
            skip_reason: None,
            duration: None,
            clock: None,
        }
    }

    /// The step with this name that is currently active
    fn active_step(&mut self, step: &str) -> Option<&mut StepProgress> {
        self.steps
            .iter_mut()
            .find(|s| s.name == step && s.status == StepStatus::Active)
    }

    fn elapsed(&self) -> Duration {
        self.clock.map(|c| c.elapsed()).unwrap_or_default()
    }
}

/// Estimated time left: average completed duration times remaining count
///
/// `None` when nothing has completed yet or nothing remains.
#[must_use]
pub fn eta_from(completed: &[Duration], remaining: usize) -> Option<Duration> {
    if completed.is_empty() || remaining == 0 {
        return None;
    }
    let count = u32::try_from(completed.len()).unwrap_or(u32::MAX);
    let average = completed.iter().sum::<Duration>() / count;
    Some(average.saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX)))
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Tracks the managers of one run
pub struct ProgressTracker {
    event_tx: broadcast::Sender<ProgressEvent>,
    managers: Vec<ManagerProgress>,
    completed: Vec<Duration>,
}

impl ProgressTracker {
    pub fn new(event_tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self {
            event_tx,
            managers: Vec::new(),
            completed: Vec::new(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn entry(&mut self, kind: ManagerKind) -> &mut ManagerProgress {
        if let Some(idx) = self.managers.iter().position(|m| m.kind == kind) {
            return &mut self.managers[idx];
        }
        self.managers.push(ManagerProgress::new(kind));
        let last = self.managers.len() - 1;
        &mut self.managers[last]
    }

    /// Reset the tracker to a fresh worklist, all pending
    pub fn plan(&mut self, kinds: &[ManagerKind]) {
        self.managers = kinds.iter().copied().map(ManagerProgress::new).collect();
        self.completed.clear();
    }

    /// Manager progress in worklist order
    #[must_use]
    pub fn managers(&self) -> &[ManagerProgress] {
        &self.managers
    }

    #[must_use]
    pub fn manager(&self, kind: ManagerKind) -> Option<&ManagerProgress> {
        self.managers.iter().find(|m| m.kind == kind)
    }

    /// Managers still waiting to run
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.managers
            .iter()
            .filter(|m| m.state == ManagerState::Pending)
            .count()
    }

    #[must_use]
    pub fn estimate_remaining(&self) -> Option<Duration> {
        eta_from(&self.completed, self.remaining())
    }

    pub fn skip_manager(&mut self, kind: ManagerKind, reason: &str) {
        let manager = self.entry(kind);
        manager.state = ManagerState::Skipped;
        manager.skip_reason = Some(reason.to_string());
        self.emit(ProgressEvent::ManagerSkipped {
            manager: kind.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Activate a manager with its default step plan
    ///
    /// `index` is 1-based.
    pub fn start_manager(&mut self, kind: ManagerKind, index: usize, total: usize) {
        let manager = self.entry(kind);
        manager.state = ManagerState::Active;
        manager.clock = Some(Instant::now());
        manager.steps = kind
            .steps()
            .iter()
            .map(|plan| StepProgress::pending(plan.name, plan.description))
            .collect();
        self.emit(ProgressEvent::ManagerStarted {
            manager: kind.to_string(),
            index,
            total,
        });
    }

    /// Complete a manager and refresh the ETA
    pub fn finish_manager(&mut self, kind: ManagerKind, packages: usize) -> Duration {
        let manager = self.entry(kind);
        let elapsed = manager.elapsed();
        manager.state = ManagerState::Completed;
        manager.duration = Some(elapsed);
        self.completed.push(elapsed);

        let eta = self.estimate_remaining();
        debug!(manager = %kind, ?elapsed, ?eta, "manager completed");
        self.emit(ProgressEvent::ManagerCompleted {
            manager: kind.to_string(),
            duration_ms: millis(elapsed),
            packages,
            eta_secs: eta.map(|d| d.as_secs()),
        });
        elapsed
    }

    pub fn fail_manager(&mut self, kind: ManagerKind, error: &str) {
        let manager = self.entry(kind);
        let elapsed = manager.elapsed();
        manager.state = ManagerState::Failed;
        manager.duration = Some(elapsed);
        self.emit(ProgressEvent::ManagerFailed {
            manager: kind.to_string(),
            error: error.to_string(),
        });
    }

    /// Free-form run-level message
    pub fn notice(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Notice {
            message: message.into(),
        });
    }
}

impl StepObserver for ProgressTracker {
    fn step_started(&mut self, kind: ManagerKind, step: &str) {
        let manager = self.entry(kind);
        if manager.active_step(step).is_some() {
            return;
        }
        match manager
            .steps
            .iter_mut()
            .find(|s| s.name == step && s.status == StepStatus::Pending)
        {
            Some(pending) => pending.activate(),
            None => {
                // Repeated per sub-unit, or not part of the default plan
                let mut extra = StepProgress::pending(step, step);
                extra.activate();
                manager.steps.push(extra);
            }
        }
        self.emit(ProgressEvent::StepStarted {
            manager: kind.to_string(),
            step: step.to_string(),
        });
    }

    fn step_completed(&mut self, kind: ManagerKind, step: &str, packages: usize) {
        let Some(active) = self.entry(kind).active_step(step) else {
            return;
        };
        active.packages += packages;
        let elapsed = active.finish(StepStatus::Completed);
        self.emit(ProgressEvent::StepCompleted {
            manager: kind.to_string(),
            step: step.to_string(),
            duration_ms: millis(elapsed),
        });
    }

    fn step_failed(&mut self, kind: ManagerKind, step: &str, error: &str) {
        let Some(active) = self.entry(kind).active_step(step) else {
            return;
        };
        active.finish(StepStatus::Failed);
        self.emit(ProgressEvent::StepFailed {
            manager: kind.to_string(),
            step: step.to_string(),
            error: error.to_string(),
        });
    }

    fn warning(&mut self, kind: ManagerKind, message: &str) {
        self.emit(ProgressEvent::Warning {
            manager: kind.to_string(),
            message: message.to_string(),
        });
    }

    fn would_run(&mut self, kind: ManagerKind, command: &CommandSpec) {
        self.emit(ProgressEvent::DryRun {
            manager: kind.to_string(),
            command: command.to_string(),
        });
    }

    fn package_changed(&mut self, change: &PackageChange) {
        self.emit(ProgressEvent::PackageChanged {
            change: change.clone(),
        });
    }
}
