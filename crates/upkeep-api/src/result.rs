//! Run result document
//!
//! The only durable output of a run. Field names follow the camelCase
//! JSON contract consumed by callers (`runId`, `mode.compat`,
//! `managers[].plugins[].envApplied`, `totals.install`, ...).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::{CompatMode, Strategy};
use crate::report::DuplicateConflict;

/// Prefix marking an action that was only previewed
pub const DRY_RUN_PREFIX: &str = "would:";

/// Whether an action tag counts as an installed/upgraded unit
#[must_use]
pub fn is_install_action(tag: &str) -> bool {
    tag == "upgrade" || tag.starts_with("install:")
}

/// Whether an action tag counts as a skipped unit
#[must_use]
pub fn is_skip_action(tag: &str) -> bool {
    tag.starts_with("skip:")
}

/// Requested mode for the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMode {
    /// Compatibility handling
    pub compat: CompatMode,
    /// Version strategy
    pub strategy: Strategy,
    /// Whether no mutating native command was allowed
    pub dry_run: bool,
    /// Allow pip inside an active conda/mamba environment
    #[serde(default, skip_serializing_if = "is_false")]
    pub pip_allow_conda: bool,
    /// Remove pacman orphan packages after upgrading
    #[serde(default, skip_serializing_if = "is_false")]
    pub pacman_clean_orphans: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Outcome of one manager's routine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerStatus {
    /// Every unit of work succeeded
    #[default]
    Success,
    /// At least one unit of work recorded an error
    Partial,
    /// The routine itself failed
    Failed,
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerStatus::Success => write!(f, "success"),
            ManagerStatus::Partial => write!(f, "partial"),
            ManagerStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Classification of a version move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Major,
    Minor,
    Patch,
    Unknown,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateType::Major => write!(f, "major"),
            UpdateType::Minor => write!(f, "minor"),
            UpdateType::Patch => write!(f, "patch"),
            UpdateType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A detected version difference for one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageChange {
    /// Package name
    pub name: String,
    /// Currently installed version
    pub old_version: String,
    /// Candidate version (`latest` when the manager cannot tell)
    pub new_version: String,
    /// Estimated download size in MB; an estimate, never measured
    pub download_mb: f64,
    /// Version move classification
    pub update_type: UpdateType,
    /// Owning manager
    pub manager: String,
}

/// One unit of work inside a manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    /// Plugin, candidate or package name (the manager itself when it has no sub-units)
    pub name: String,
    /// Action tags applied, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Environment variables actually applied
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_applied: BTreeMap<String, String>,
    /// Advisory warnings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Number of applicable conflict filters
    #[serde(default, skip_serializing_if = "is_zero")]
    pub conflicts: u32,
    /// Error recorded for this unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResult {
    /// Create an empty result for a unit of work
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append an action tag
    pub fn push_action(&mut self, tag: impl Into<String>) {
        self.actions.push(tag.into());
    }

    /// Append an action tag, prefixed with `would:` when only previewed
    pub fn push_action_for(&mut self, tag: &str, dry_run: bool) {
        if dry_run {
            self.actions.push(format!("{DRY_RUN_PREFIX}{tag}"));
        } else {
            self.actions.push(tag.to_string());
        }
    }

    /// Whether an error was recorded
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of one manager touched in the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerResult {
    /// Manager name
    pub name: String,
    /// Overall status
    pub status: ManagerStatus,
    /// Units of work, in processing order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginResult>,
    /// Top-level error when the routine failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Version changes detected for this manager
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<PackageChange>,
}

impl ManagerResult {
    /// Create a successful, empty manager result
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ManagerStatus::Success,
            plugins: Vec::new(),
            error: None,
            changes: Vec::new(),
        }
    }

    /// Record a finished unit of work
    ///
    /// A unit carrying an error degrades `success` to `partial`; the status
    /// is never promoted back.
    pub fn add_plugin(&mut self, plugin: PluginResult) {
        if plugin.has_error() && self.status == ManagerStatus::Success {
            self.status = ManagerStatus::Partial;
        }
        self.plugins.push(plugin);
    }

    /// Mark the routine as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ManagerStatus::Failed;
        self.error = Some(error.into());
    }
}

/// A manager excluded before processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    /// Manager name
    pub name: String,
    /// Human-readable reason
    pub reason: String,
}

/// Aggregate counters for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub install: u32,
    pub skip: u32,
    pub warnings: u32,
    pub conflicts: u32,
}

/// The document produced by one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Time-derived run identifier
    pub run_id: String,
    /// Requested mode
    pub mode: RunMode,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was finalized
    pub finished_at: DateTime<Utc>,
    /// Managers touched, in processing order
    pub managers: Vec<ManagerResult>,
    /// Managers skipped before processing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkipRecord>,
    /// Binaries provided by more than one manager
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateConflict>,
    /// Aggregate counters
    pub totals: Totals,
    /// Run-level error (pre-flight failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the caller stopped the run early
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancelled: bool,
}

impl RunResult {
    /// Start a new run now
    #[must_use]
    pub fn start(mode: RunMode) -> Self {
        let now = Utc::now();
        Self::new(run_id_for(now), mode, now)
    }

    /// Create a run with an explicit identifier and start time
    pub fn new(run_id: impl Into<String>, mode: RunMode, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            mode,
            started_at,
            finished_at: started_at,
            managers: Vec::new(),
            skipped: Vec::new(),
            duplicates: Vec::new(),
            totals: Totals::default(),
            error: None,
            cancelled: false,
        }
    }

    /// Get the manager result, creating it on first reference
    pub fn ensure_manager(&mut self, name: &str) -> &mut ManagerResult {
        if let Some(idx) = self.managers.iter().position(|m| m.name == name) {
            return &mut self.managers[idx];
        }
        self.managers.push(ManagerResult::new(name));
        let last = self.managers.len() - 1;
        &mut self.managers[last]
    }

    /// Look up a manager result
    #[must_use]
    pub fn manager(&self, name: &str) -> Option<&ManagerResult> {
        self.managers.iter().find(|m| m.name == name)
    }

    /// Record a manager that was excluded before processing
    pub fn record_skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkipRecord {
            name: name.into(),
            reason: reason.into(),
        });
    }

    /// Compute totals from the recorded managers and skips
    #[must_use]
    pub fn compute_totals(&self) -> Totals {
        let mut totals = Totals {
            #[allow(clippy::cast_possible_truncation)]
            skip: self.skipped.len() as u32,
            ..Totals::default()
        };

        for plugin in self.managers.iter().flat_map(|m| &m.plugins) {
            for action in &plugin.actions {
                if is_install_action(action) {
                    totals.install += 1;
                } else if is_skip_action(action) {
                    totals.skip += 1;
                }
            }
            #[allow(clippy::cast_possible_truncation)]
            let warnings = plugin.warnings.len() as u32;
            totals.warnings += warnings;
            totals.conflicts += plugin.conflicts;
        }

        totals
    }

    /// Freeze the document: compute totals and stamp the finish time
    pub fn finalize(&mut self, finished_at: DateTime<Utc>) {
        self.totals = self.compute_totals();
        self.finished_at = finished_at;
    }

    /// Whether no manager failed and no run-level error occurred
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && self
                .managers
                .iter()
                .all(|m| m.status != ManagerStatus::Failed)
    }

    /// Process exit code for this result
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Derive a run identifier from a timestamp
#[must_use]
pub fn run_id_for(at: DateTime<Utc>) -> String {
    format!(
        "{}-{:03}",
        at.format("%Y%m%dT%H%M%SZ"),
        at.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_run() -> RunResult {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        RunResult::new(run_id_for(at), RunMode::default(), at)
    }

    #[test]
    fn test_run_id_format() {
        let run = fixed_run();
        assert_eq!(run.run_id, "20250301T120000Z-000");
    }

    #[test]
    fn test_status_degrades_and_never_recovers() {
        let mut mgr = ManagerResult::new("asdf");
        mgr.add_plugin(PluginResult::new("nodejs"));
        assert_eq!(mgr.status, ManagerStatus::Success);

        let mut broken = PluginResult::new("python");
        broken.error = Some("install failed".to_string());
        mgr.add_plugin(broken);
        assert_eq!(mgr.status, ManagerStatus::Partial);

        mgr.add_plugin(PluginResult::new("ruby"));
        assert_eq!(mgr.status, ManagerStatus::Partial);
    }

    #[test]
    fn test_failed_status_is_not_downgraded_to_partial() {
        let mut mgr = ManagerResult::new("brew");
        mgr.fail("brew update failed");

        let mut broken = PluginResult::new("brew");
        broken.error = Some("boom".to_string());
        mgr.add_plugin(broken);

        assert_eq!(mgr.status, ManagerStatus::Failed);
    }

    #[test]
    fn test_ensure_manager_is_lazy_and_unique() {
        let mut run = fixed_run();
        assert!(run.manager("brew").is_none());

        run.ensure_manager("brew");
        run.ensure_manager("brew").add_plugin(PluginResult::new("brew"));

        assert_eq!(run.managers.len(), 1);
        assert_eq!(run.managers[0].plugins.len(), 1);
    }

    #[test]
    fn test_totals_ignore_dry_run_actions() {
        let mut run = fixed_run();
        let mut plugin = PluginResult::new("nodejs");
        plugin.push_action_for("install:latest", true);
        plugin.push_action("skip:latest");
        plugin.warnings.push("corepack shims".to_string());
        plugin.conflicts = 2;
        run.ensure_manager("asdf").add_plugin(plugin);

        let mut pip = PluginResult::new("requests");
        pip.push_action("install:requests");
        run.ensure_manager("pip").add_plugin(pip);
        run.record_skip("yay", "not installed");

        let totals = run.compute_totals();
        assert_eq!(totals.install, 1);
        assert_eq!(totals.skip, 2);
        assert_eq!(totals.warnings, 1);
        assert_eq!(totals.conflicts, 2);
    }

    #[test]
    fn test_exit_code() {
        let mut run = fixed_run();
        run.ensure_manager("brew");
        assert_eq!(run.exit_code(), 0);

        run.ensure_manager("npm").fail("npm update -g failed");
        assert_eq!(run.exit_code(), 1);

        run.cancelled = true;
        assert_eq!(run.exit_code(), 130);
    }

    #[test]
    fn test_json_field_names() {
        let mut run = fixed_run();
        let mut plugin = PluginResult::new("nodejs");
        plugin
            .env_applied
            .insert("COREPACK_ENABLE_STRICT".to_string(), "0".to_string());
        run.ensure_manager("asdf").add_plugin(plugin);
        run.finalize(run.started_at);

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["runId"], "20250301T120000Z-000");
        assert_eq!(json["mode"]["compat"], "auto");
        assert_eq!(json["managers"][0]["status"], "success");
        assert_eq!(
            json["managers"][0]["plugins"][0]["envApplied"]["COREPACK_ENABLE_STRICT"],
            "0"
        );
        assert_eq!(json["totals"]["install"], 0);
        assert!(json.get("startedAt").is_some());
        assert!(json.get("finishedAt").is_some());
        assert!(json.get("error").is_none());
        assert!(json.get("cancelled").is_none());
    }
}
