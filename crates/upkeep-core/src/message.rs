//! Message types for the update coordinator
//!
//! Message handlers are implemented in [`crate::actor::coordinator`].

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use upkeep_api::{CompatMode, RunMode, Strategy};
use upkeep_pkg::{LOCK_RETRY_DELAY, ManagerKind, UpdateOptions};

use crate::error::CoreError;

/// Which managers a run covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ManagerSelection {
    /// Every supported manager, in processing order
    #[default]
    All,
    /// An explicit list, in the order given
    Only(Vec<ManagerKind>),
}

impl ManagerSelection {
    /// Parse `all`, a single name, or a comma separated list
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidSelection` for unknown manager names
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let mut kinds: Vec<ManagerKind> = Vec::new();
        for name in input.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let kind: ManagerKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        if kinds.is_empty() {
            return Err(CoreError::InvalidSelection(format!("no managers in {input:?}")));
        }
        Ok(Self::Only(kinds))
    }

    /// The worklist before support and presence checks
    #[must_use]
    pub fn kinds(&self) -> Vec<ManagerKind> {
        match self {
            Self::All => ManagerKind::ALL.to_vec(),
            Self::Only(kinds) => kinds.clone(),
        }
    }
}

/// What the caller asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub managers: ManagerSelection,
    pub strategy: Strategy,
    pub compat: CompatMode,
    pub dry_run: bool,
    pub pip_allow_conda: bool,
    pub pacman_clean_orphans: bool,
}

impl UpdateRequest {
    /// Options handed to every routine
    #[must_use]
    pub fn options(&self) -> UpdateOptions {
        UpdateOptions {
            strategy: self.strategy,
            compat: self.compat,
            dry_run: self.dry_run,
            pip_allow_conda: self.pip_allow_conda,
            pacman_clean_orphans: self.pacman_clean_orphans,
            lock_retry_delay: LOCK_RETRY_DELAY,
        }
    }

    /// Mode recorded on the run result
    #[must_use]
    pub fn mode(&self) -> RunMode {
        RunMode {
            compat: self.compat,
            strategy: self.strategy,
            dry_run: self.dry_run,
            pip_allow_conda: self.pip_allow_conda,
            pacman_clean_orphans: self.pacman_clean_orphans,
        }
    }
}

/// Run one update; replies with the finished run result
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub request: UpdateRequest,
    /// Checked between managers and before every native call
    pub cancel: CancellationToken,
}

/// Report support and presence of every manager
#[derive(Debug, Clone, Copy)]
pub struct GetOverview;

/// Whether one manager would take part in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerAvailability {
    pub manager: ManagerKind,
    pub available: bool,
    /// Why the manager would be skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
