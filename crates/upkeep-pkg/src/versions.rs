//! Version & change tracking
//!
//! Classifies version moves and estimates download sizes. Sizes are
//! approximations for resource planning, never measured values.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use upkeep_api::{PackageChange, UpdateType};

use crate::types::ManagerKind;

/// Target used when a manager cannot tell the candidate version
pub const LATEST_PLACEHOLDER: &str = "latest";

/// Parse `major.minor.patch`, ignoring a leading `v` and `-suffix` per part
fn parse_triple(version: &str) -> Option<[u64; 3]> {
    let version = version
        .trim()
        .strip_prefix(['v', 'V'])
        .unwrap_or(version.trim());

    let mut parts = version.split('.');
    let mut triple = [0u64; 3];
    for slot in &mut triple {
        let part = parts.next()?;
        let numeric = part.split('-').next().unwrap_or(part);
        *slot = numeric.parse().ok()?;
    }
    Some(triple)
}

/// Classify the move from `old` to `new`
///
/// Both versions need three numeric components; anything else, including
/// an unchanged or lower version, is `unknown`.
///
/// Components are compared most significant first and only an increase
/// counts, so a downgrade such as `2.0.0` to `1.9.9` is `unknown` rather
/// than being reported by the first component that differs.
#[must_use]
pub fn classify_update(old: &str, new: &str) -> UpdateType {
    let (Some(old), Some(new)) = (parse_triple(old), parse_triple(new)) else {
        return UpdateType::Unknown;
    };

    match (new[0].cmp(&old[0]), new[1].cmp(&old[1]), new[2].cmp(&old[2])) {
        (Ordering::Greater, _, _) => UpdateType::Major,
        (Ordering::Equal, Ordering::Greater, _) => UpdateType::Minor,
        (Ordering::Equal, Ordering::Equal, Ordering::Greater) => UpdateType::Patch,
        _ => UpdateType::Unknown,
    }
}

fn known_package_mb(kind: ManagerKind, name: &str) -> Option<f64> {
    let size = match (kind, name) {
        (ManagerKind::Brew, "node") => 24.8,
        (ManagerKind::Brew, "git") => 8.4,
        (ManagerKind::Brew, "python") => 15.2,
        (ManagerKind::Brew, "jq") => 1.1,
        (ManagerKind::Brew, "tree") => 0.156,
        (ManagerKind::Brew, "go") => 45.0,
        (ManagerKind::Brew, "rust") => 85.0,
        (ManagerKind::Brew, "docker") => 120.0,
        (ManagerKind::Brew, "kubernetes-cli") => 12.5,
        (ManagerKind::Asdf, "nodejs") => 25.0,
        (ManagerKind::Asdf, "python") => 20.0,
        (ManagerKind::Asdf, "golang") => 50.0,
        (ManagerKind::Asdf, "rust") => 90.0,
        (ManagerKind::Asdf, "ruby") => 15.0,
        (ManagerKind::Asdf, "java") => 180.0,
        (ManagerKind::Npm, "@angular/cli") => 45.0,
        (ManagerKind::Npm, "typescript") => 8.2,
        (ManagerKind::Npm, "prettier") => 2.1,
        (ManagerKind::Npm, "eslint") => 5.8,
        (ManagerKind::Npm, "webpack") => 12.5,
        (ManagerKind::Pip, "requests") => 2.1,
        (ManagerKind::Pip, "numpy") => 15.2,
        (ManagerKind::Pip, "pandas") => 25.8,
        (ManagerKind::Pip, "matplotlib") => 18.5,
        (ManagerKind::Pip, "django") => 8.9,
        (ManagerKind::Pip, "flask") => 2.3,
        _ => return None,
    };
    Some(size)
}

fn manager_default_mb(kind: ManagerKind) -> f64 {
    match kind {
        ManagerKind::Brew => 5.0,
        ManagerKind::Asdf => 20.0,
        ManagerKind::Npm => 3.5,
        ManagerKind::Pip => 2.8,
        ManagerKind::Apt => 1.5,
        ManagerKind::Pacman => 2.0,
        ManagerKind::Yay => 3.0,
        ManagerKind::Sdkman => 25.0,
    }
}

/// Estimated download size of one package in MB
///
/// Known package table first, then the manager default. The manager set
/// is closed, so every manager has its own default.
#[must_use]
pub fn estimate_package_size(kind: ManagerKind, name: &str) -> f64 {
    known_package_mb(kind, name).unwrap_or_else(|| manager_default_mb(kind))
}

/// Build a change record with estimated size and classification
#[must_use]
pub fn package_change(kind: ManagerKind, name: &str, old: &str, new: &str) -> PackageChange {
    PackageChange {
        name: name.to_string(),
        old_version: old.to_string(),
        new_version: new.to_string(),
        download_mb: estimate_package_size(kind, name),
        update_type: classify_update(old, new),
        manager: kind.as_str().to_string(),
    }
}

/// Change record for managers that only know the installed version
#[must_use]
pub fn placeholder_change(kind: ManagerKind, name: &str, old: &str) -> PackageChange {
    PackageChange {
        update_type: UpdateType::Unknown,
        ..package_change(kind, name, old, LATEST_PLACEHOLDER)
    }
}

/// Collects detected changes per manager for the current run
#[derive(Debug, Default)]
pub struct VersionTracker {
    changes: BTreeMap<ManagerKind, Vec<PackageChange>>,
}

impl VersionTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one change
    pub fn record(&mut self, kind: ManagerKind, change: PackageChange) {
        self.changes.entry(kind).or_default().push(change);
    }

    /// Changes recorded for a manager
    #[must_use]
    pub fn changes(&self, kind: ManagerKind) -> &[PackageChange] {
        self.changes.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Remove and return the changes of a manager
    pub fn take(&mut self, kind: ManagerKind) -> Vec<PackageChange> {
        self.changes.remove(&kind).unwrap_or_default()
    }

    /// Total number of recorded changes
    #[must_use]
    pub fn total(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    /// Estimated download across every recorded change, in MB
    #[must_use]
    pub fn estimated_download_mb(&self) -> f64 {
        self.changes
            .values()
            .flatten()
            .map(|c| c.download_mb)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_update() {
        assert_eq!(classify_update("1.2.3", "1.3.0"), UpdateType::Minor);
        assert_eq!(classify_update("1.2.3", "2.0.0"), UpdateType::Major);
        assert_eq!(classify_update("1.2.3", "1.2.4"), UpdateType::Patch);
        assert_eq!(classify_update("1.2.3", "1.2.3"), UpdateType::Unknown);
        assert_eq!(classify_update("abc", "1.2.3"), UpdateType::Unknown);
    }

    #[test]
    fn test_classify_strips_prefix_and_suffix() {
        assert_eq!(classify_update("v20.11.0", "v20.11.1"), UpdateType::Patch);
        assert_eq!(classify_update("1.2.3-beta", "1.3.0-rc1"), UpdateType::Minor);
    }

    #[test]
    fn test_classify_never_guesses() {
        assert_eq!(classify_update("1.2", "1.3"), UpdateType::Unknown);
        assert_eq!(classify_update("1.2.x", "1.2.4"), UpdateType::Unknown);
        assert_eq!(classify_update("1.2.3", "latest"), UpdateType::Unknown);
    }

    #[test]
    fn test_downgrade_is_unknown() {
        assert_eq!(classify_update("2.0.0", "1.9.9"), UpdateType::Unknown);
        assert_eq!(classify_update("1.5.0", "1.4.9"), UpdateType::Unknown);
        assert_eq!(classify_update("1.2.3", "1.2.2"), UpdateType::Unknown);
        // a lower minor does not hide behind a higher patch
        assert_eq!(classify_update("1.5.0", "1.4.9"), classify_update("1.5.0", "1.4.0"));
    }

    #[test]
    fn test_estimate_package_size_fallbacks() {
        assert!((estimate_package_size(ManagerKind::Brew, "node") - 24.8).abs() < f64::EPSILON);
        assert!((estimate_package_size(ManagerKind::Brew, "htop") - 5.0).abs() < f64::EPSILON);
        assert!((estimate_package_size(ManagerKind::Apt, "vim") - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_placeholder_change_is_unknown() {
        let change = placeholder_change(ManagerKind::Pip, "requests", "2.31.0");
        assert_eq!(change.new_version, LATEST_PLACEHOLDER);
        assert_eq!(change.update_type, UpdateType::Unknown);
        assert!((change.download_mb - 2.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tracker_take() {
        let mut tracker = VersionTracker::new();
        tracker.record(
            ManagerKind::Brew,
            package_change(ManagerKind::Brew, "jq", "1.6.0", "1.7.1"),
        );
        assert_eq!(tracker.total(), 1);
        assert_eq!(tracker.changes(ManagerKind::Brew).len(), 1);

        let taken = tracker.take(ManagerKind::Brew);
        assert_eq!(taken[0].update_type, UpdateType::Minor);
        assert!(tracker.changes(ManagerKind::Brew).is_empty());
    }
}
