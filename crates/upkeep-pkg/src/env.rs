//! Environment snapshot
//!
//! Captured once per run. Filter applicability and executable lookup are
//! evaluated against the snapshot, never against the live process
//! environment, so both stay pure and testable.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Operating system, architecture, variables and search path of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// `std::env::consts::OS` name
    pub os: String,
    /// `std::env::consts::ARCH` name
    pub arch: String,
    /// Environment variables
    pub vars: BTreeMap<String, String>,
    /// Home directory
    pub home: Option<PathBuf>,
    /// Working directory, used for relative search path entries
    pub cwd: PathBuf,
}

impl EnvSnapshot {
    /// Capture the current process environment
    #[must_use]
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Create an empty snapshot for an OS/arch pair
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            vars: BTreeMap::new(),
            home: None,
            cwd: PathBuf::from("."),
        }
    }

    /// Set a variable
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set the home directory
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Look up a variable; empty values count as unset
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Directories of the executable search path, in order
    #[must_use]
    pub fn path_dirs(&self) -> Vec<PathBuf> {
        self.var("PATH")
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default()
    }

    /// Resolve an executable on the snapshot's search path
    #[must_use]
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        let path = self.var("PATH")?;
        which::which_in(name, Some(path), &self.cwd).ok()
    }

    /// Whether an executable is present on the search path
    #[must_use]
    pub fn has_executable(&self, name: &str) -> bool {
        self.find_executable(name).is_some()
    }

    /// SDKMAN installation directory (`$SDKMAN_DIR`, else `~/.sdkman`)
    #[must_use]
    pub fn sdkman_dir(&self) -> Option<PathBuf> {
        self.var("SDKMAN_DIR")
            .map(PathBuf::from)
            .or_else(|| self.home.as_ref().map(|h| h.join(".sdkman")))
    }
}
