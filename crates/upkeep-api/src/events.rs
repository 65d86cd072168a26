//! Progress event types
//!
//! Emitted on a broadcast channel while a run is in flight. Purely
//! informational: the durable output is the [`crate::RunResult`].

use serde::{Deserialize, Serialize};

use crate::report::{DuplicateConflict, ResourceReport};
use crate::result::PackageChange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    RunStarted {
        run_id: String,
        managers: Vec<String>,
        dry_run: bool,
    },
    ManagerSkipped {
        manager: String,
        reason: String,
    },
    ResourceCheck {
        report: ResourceReport,
    },
    Duplicates {
        conflicts: Vec<DuplicateConflict>,
    },
    ManagerStarted {
        manager: String,
        index: usize,
        total: usize,
    },
    StepStarted {
        manager: String,
        step: String,
    },
    StepCompleted {
        manager: String,
        step: String,
        duration_ms: u64,
    },
    StepFailed {
        manager: String,
        step: String,
        error: String,
    },
    ManagerCompleted {
        manager: String,
        duration_ms: u64,
        packages: usize,
        eta_secs: Option<u64>,
    },
    ManagerFailed {
        manager: String,
        error: String,
    },
    Warning {
        manager: String,
        message: String,
    },
    DryRun {
        manager: String,
        command: String,
    },
    PackageChanged {
        change: PackageChange,
    },
    Notice {
        message: String,
    },
}

impl ProgressEvent {
    /// Manager the event refers to, if any
    #[must_use]
    pub fn manager(&self) -> Option<&str> {
        match self {
            ProgressEvent::ManagerSkipped { manager, .. }
            | ProgressEvent::ManagerStarted { manager, .. }
            | ProgressEvent::StepStarted { manager, .. }
            | ProgressEvent::StepCompleted { manager, .. }
            | ProgressEvent::StepFailed { manager, .. }
            | ProgressEvent::ManagerCompleted { manager, .. }
            | ProgressEvent::ManagerFailed { manager, .. }
            | ProgressEvent::Warning { manager, .. }
            | ProgressEvent::DryRun { manager, .. } => Some(manager),
            ProgressEvent::PackageChanged { change } => Some(&change.manager),
            ProgressEvent::RunStarted { .. }
            | ProgressEvent::ResourceCheck { .. }
            | ProgressEvent::Duplicates { .. }
            | ProgressEvent::Notice { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_internally_tagged() {
        let event = ProgressEvent::DryRun {
            manager: "brew".to_string(),
            command: "brew upgrade".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DryRun");
        assert_eq!(json["command"], "brew upgrade");
        assert_eq!(event.manager(), Some("brew"));
    }
}
