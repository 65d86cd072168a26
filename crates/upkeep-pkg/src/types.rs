//! Type definitions for package management

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use upkeep_api::{CompatMode, Strategy};

use crate::error::PackageError;

/// Supported package managers
///
/// The declaration order is the processing order used for "all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    /// Homebrew (macOS, Linuxbrew)
    Brew,
    /// asdf version manager
    Asdf,
    /// SDKMAN! JVM candidate manager
    Sdkman,
    /// APT (Debian/Ubuntu)
    Apt,
    /// pacman (Arch/Manjaro)
    Pacman,
    /// yay AUR helper
    Yay,
    /// pip (Python)
    Pip,
    /// npm global packages
    Npm,
}

/// One default step in a manager's routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub name: &'static str,
    pub description: &'static str,
}

const fn step(name: &'static str, description: &'static str) -> StepPlan {
    StepPlan { name, description }
}

const BREW_STEPS: &[StepPlan] = &[
    step("update", "Updating Homebrew formulae"),
    step("upgrade", "Upgrading packages"),
    step("cleanup", "Cleaning up old versions"),
];
const ASDF_STEPS: &[StepPlan] = &[
    step("plugin_update", "Updating asdf plugins"),
    step("version_check", "Checking for version updates"),
    step("install", "Installing updated versions"),
    step("post_actions", "Running post-install actions"),
];
const SDKMAN_STEPS: &[StepPlan] = &[
    step("selfupdate", "Updating SDKMAN itself"),
    step("update", "Refreshing candidate metadata"),
];
const APT_STEPS: &[StepPlan] = &[
    step("update", "Updating package lists"),
    step("upgrade", "Upgrading packages"),
];
const PACMAN_STEPS: &[StepPlan] = &[
    step("sync_update", "Syncing and updating system"),
    step("cleanup", "Cleaning orphaned packages"),
];
const YAY_STEPS: &[StepPlan] = &[
    step("update", "Updating AUR packages"),
    step("cleanup", "Cleaning package cache"),
];
const PIP_STEPS: &[StepPlan] = &[
    step("upgrade_pip", "Upgrading pip itself"),
    step("check_outdated", "Finding outdated packages"),
    step("upgrade_packages", "Upgrading packages"),
];
const NPM_STEPS: &[StepPlan] = &[
    step("check", "Checking global packages"),
    step("update", "Updating global packages"),
];

impl ManagerKind {
    /// All managers in processing order
    pub const ALL: [ManagerKind; 8] = [
        ManagerKind::Brew,
        ManagerKind::Asdf,
        ManagerKind::Sdkman,
        ManagerKind::Apt,
        ManagerKind::Pacman,
        ManagerKind::Yay,
        ManagerKind::Pip,
        ManagerKind::Npm,
    ];

    /// Manager name as used on the command line and in results
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ManagerKind::Brew => "brew",
            ManagerKind::Asdf => "asdf",
            ManagerKind::Sdkman => "sdkman",
            ManagerKind::Apt => "apt",
            ManagerKind::Pacman => "pacman",
            ManagerKind::Yay => "yay",
            ManagerKind::Pip => "pip",
            ManagerKind::Npm => "npm",
        }
    }

    /// Check whether the manager can run on an operating system
    ///
    /// `os` uses `std::env::consts::OS` names (`linux`, `macos`, ...).
    ///
    /// # Errors
    /// Returns a human-readable reason when unsupported
    pub fn check_support(self, os: &str) -> Result<(), &'static str> {
        let unix = os == "macos" || os == "linux";
        match self {
            ManagerKind::Brew | ManagerKind::Sdkman if !unix => {
                Err("not supported on this OS")
            }
            ManagerKind::Apt if os != "linux" => Err("apt is Linux only"),
            ManagerKind::Pacman | ManagerKind::Yay if os != "linux" => {
                Err("Arch/Manjaro family only")
            }
            _ => Ok(()),
        }
    }

    /// Default step plan for progress tracking
    #[must_use]
    pub fn steps(self) -> &'static [StepPlan] {
        match self {
            ManagerKind::Brew => BREW_STEPS,
            ManagerKind::Asdf => ASDF_STEPS,
            ManagerKind::Sdkman => SDKMAN_STEPS,
            ManagerKind::Apt => APT_STEPS,
            ManagerKind::Pacman => PACMAN_STEPS,
            ManagerKind::Yay => YAY_STEPS,
            ManagerKind::Pip => PIP_STEPS,
            ManagerKind::Npm => NPM_STEPS,
        }
    }

    /// Average download per package in MB, for resource planning
    #[must_use]
    pub fn average_package_mb(self) -> f64 {
        match self {
            ManagerKind::Brew => 8.5,
            ManagerKind::Asdf => 25.0,
            ManagerKind::Sdkman => 35.0,
            ManagerKind::Apt => 2.8,
            ManagerKind::Pacman => 3.5,
            ManagerKind::Yay => 4.0,
            ManagerKind::Pip => 3.1,
            ManagerKind::Npm => 4.2,
        }
    }

    /// Conservative package count used when the real count is unknown
    #[must_use]
    pub fn default_package_count(self) -> u32 {
        match self {
            ManagerKind::Brew | ManagerKind::Yay => 5,
            ManagerKind::Asdf => 2,
            ManagerKind::Sdkman => 1,
            ManagerKind::Apt => 12,
            ManagerKind::Pacman => 15,
            ManagerKind::Pip => 6,
            ManagerKind::Npm => 8,
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagerKind {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ManagerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| PackageError::UnknownManager(s.trim().to_string()))
    }
}

/// A package with an available update, as reported by a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradablePackage {
    /// Package name
    pub name: String,
    /// Current installed version
    pub current_version: String,
    /// Available upgrade version
    pub new_version: String,
    /// Package architecture
    pub arch: Option<String>,
}

impl UpgradablePackage {
    /// Create a new upgradable package
    pub fn new(
        name: impl Into<String>,
        current: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            current_version: current.into(),
            new_version: new.into(),
            arch: None,
        }
    }

    /// Set architecture
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }
}

/// Options threaded through every routine of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub strategy: Strategy,
    pub compat: CompatMode,
    pub dry_run: bool,
    pub pip_allow_conda: bool,
    pub pacman_clean_orphans: bool,
    /// Wait before retrying a step that hit a package database lock
    pub lock_retry_delay: Duration,
}
