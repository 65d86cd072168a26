//! Pre-flight and duplicate reports

use serde::{Deserialize, Serialize};

/// Outcome of the pre-flight resource check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub disk_space_ok: bool,
    pub available_gb: f64,
    pub required_gb: f64,
    pub estimated_download_mb: f64,
    pub network_ok: bool,
    pub reachable_repos: usize,
    pub total_repos: usize,
    pub memory_ok: bool,
    pub available_memory_mb: u64,
    /// Human-readable advice
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    /// Probe errors (a failing probe never passes silently)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ResourceReport {
    /// Whether the run may proceed
    ///
    /// Insufficient disk and zero reachable repositories are hard failures.
    /// Partial reachability and low memory only produce recommendations.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.disk_space_ok && !self.network_unreachable()
    }

    /// Whether every probed repository was unreachable
    #[must_use]
    pub fn network_unreachable(&self) -> bool {
        self.total_repos > 0 && self.reachable_repos == 0
    }

    /// Short reason for a failed gate
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        if !self.disk_space_ok {
            return Some(format!(
                "insufficient disk space: {:.1}GB available, {:.1}GB required",
                self.available_gb, self.required_gb
            ));
        }
        if self.network_unreachable() {
            return Some(format!(
                "network check failed: {}/{} repositories reachable",
                self.reachable_repos, self.total_repos
            ));
        }
        None
    }
}

/// A binary name provided by more than one manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateConflict {
    /// Binary name as found on the search path
    pub binary: String,
    /// Managers providing it, sorted
    pub managers: Vec<String>,
}

impl DuplicateConflict {
    /// One-line summary, e.g. `node: asdf, brew`
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {}", self.binary, self.managers.join(", "))
    }
}
