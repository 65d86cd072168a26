//! Engine configuration
//!
//! Built once at startup and handed to the coordinator by value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use upkeep_pkg::{EnvSnapshot, FilterDocument, FilterSet};

use crate::error::CoreError;

/// Environment variable naming a filter overlay file
pub const COMPAT_CONFIG_ENV: &str = "UPKEEP_COMPAT_CONFIG";

/// Thresholds for the pre-flight resource check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    /// Minimum free disk space in GB
    pub min_disk_gb: f64,
    /// Required headroom as a multiple of the estimated download
    pub disk_multiplier: f64,
    /// Memory floor in MB
    pub min_memory_mb: u64,
    /// Timeout for one repository probe
    pub probe_timeout: Duration,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_disk_gb: 1.0,
            disk_multiplier: 2.5,
            min_memory_mb: 256,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Duplicate binary detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateConfig {
    /// Whether to scan the search path before updating
    pub enabled: bool,
    /// Maximum number of conflicts shown in the human summary
    pub max_shown: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_shown: 10,
        }
    }
}

/// Everything the engine needs besides the request itself
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Built-in compatibility filters plus the user overlay
    pub filters: FilterSet,
    pub duplicates: DuplicateConfig,
    pub thresholds: ResourceThresholds,
    /// Sampling interval of the resource monitor, when enabled
    pub monitor_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filters: FilterSet::builtin(),
            duplicates: DuplicateConfig::default(),
            thresholds: ResourceThresholds::default(),
            monitor_interval: None,
        }
    }
}

impl EngineConfig {
    /// Built-in filters merged with the overlay found by [`locate_overlay`]
    ///
    /// # Errors
    /// Returns `CoreError::ConfigError` if an explicitly named overlay is
    /// missing or any overlay is malformed
    pub fn load(explicit: Option<&Path>, env: &EnvSnapshot) -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Some(overlay) = locate_overlay(explicit, env) {
            let document = read_overlay(&overlay.path)?;
            info!(
                path = %overlay.path.display(),
                filters = document.filters.len(),
                "loaded compatibility overlay"
            );
            config.filters = config.filters.with_overlay(document);
        } else {
            debug!("no compatibility overlay");
        }

        Ok(config)
    }
}

/// Where an overlay came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLocation {
    pub path: PathBuf,
    /// Named by flag or environment rather than found at the default path
    pub explicit: bool,
}

/// Find the user filter overlay
///
/// Order: `explicit` (the `--compat-config` flag), then
/// `UPKEEP_COMPAT_CONFIG`, then `<config dir>/upkeep/compat.toml` if it
/// exists. The config dir is `$XDG_CONFIG_HOME`, else the platform default.
#[must_use]
pub fn locate_overlay(explicit: Option<&Path>, env: &EnvSnapshot) -> Option<OverlayLocation> {
    if let Some(path) = explicit {
        return Some(OverlayLocation {
            path: path.to_path_buf(),
            explicit: true,
        });
    }
    if let Some(path) = env.var(COMPAT_CONFIG_ENV) {
        return Some(OverlayLocation {
            path: PathBuf::from(path),
            explicit: true,
        });
    }

    let config_dir = env
        .var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    let path = config_dir.join("upkeep").join("compat.toml");
    path.is_file().then_some(OverlayLocation {
        path,
        explicit: false,
    })
}

fn read_overlay(path: &Path) -> Result<FilterDocument, CoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::ConfigError(format!("{}: {e}", path.display())))?;
    FilterDocument::from_toml(&content)
        .map_err(|e| CoreError::ConfigError(format!("{}: {e}", path.display())))
}
