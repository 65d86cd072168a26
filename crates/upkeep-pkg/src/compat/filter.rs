//! Compatibility filter rules

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::EnvSnapshot;

/// Wildcard plugin name matching every sub-unit of a manager
pub const ANY_PLUGIN: &str = "*";

/// Whether a filter only informs or reports a conflict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Advisory,
    Conflict,
}

/// Platform and companion-tool conditions; empty lists always hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Operating systems (`linux`, `macos`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
    /// CPU architectures (`x86_64`, `aarch64`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    /// Executables that must all be on the search path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executables: Vec<String>,
}

/// Condition on the content of an environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvMatch {
    /// Variable name
    pub var: String,
    /// Substring that must occur in the variable's value
    pub contains: String,
}

/// Command run after a sub-unit was processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAction {
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Human description, also used in the `post:` action tag
    pub description: String,
    /// Failures are not reported as warnings
    #[serde(default)]
    pub ignore_error: bool,
    /// Extra environment for this command only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Declarative rule keyed by (manager, plugin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityFilter {
    pub manager: String,
    /// Sub-unit name, or `*` for every sub-unit
    pub plugin: String,
    #[serde(default)]
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub when: Conditions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_env: Vec<EnvMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<PostAction>,
}

impl CompatibilityFilter {
    /// Create an advisory filter without conditions
    pub fn new(manager: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            plugin: plugin.into(),
            kind: FilterKind::Advisory,
            warning: None,
            env: BTreeMap::new(),
            when: Conditions::default(),
            match_env: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Mark as a conflict
    #[must_use]
    pub fn conflict(mut self) -> Self {
        self.kind = FilterKind::Conflict;
        self
    }

    /// Set the warning text
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Inject an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Restrict to operating systems
    #[must_use]
    pub fn on_os(mut self, os: &[&str]) -> Self {
        self.when.os = os.iter().map(ToString::to_string).collect();
        self
    }

    /// Restrict to CPU architectures
    #[must_use]
    pub fn on_arch(mut self, arch: &[&str]) -> Self {
        self.when.arch = arch.iter().map(ToString::to_string).collect();
        self
    }

    /// Require an executable on the search path
    #[must_use]
    pub fn requires(mut self, executable: impl Into<String>) -> Self {
        self.when.executables.push(executable.into());
        self
    }

    /// Require a substring in an environment variable
    #[must_use]
    pub fn when_env_contains(mut self, var: impl Into<String>, needle: impl Into<String>) -> Self {
        self.match_env.push(EnvMatch {
            var: var.into(),
            contains: needle.into(),
        });
        self
    }

    /// Append a post action
    #[must_use]
    pub fn with_post(mut self, action: PostAction) -> Self {
        self.post.push(action);
        self
    }

    /// Whether the filter is keyed to this (manager, plugin) pair
    #[must_use]
    pub fn matches(&self, manager: &str, plugin: &str) -> bool {
        self.manager == manager && (self.plugin == ANY_PLUGIN || self.plugin == plugin)
    }

    /// Whether every declared condition holds in the snapshot
    #[must_use]
    pub fn applies(&self, env: &EnvSnapshot) -> bool {
        let when = &self.when;
        (when.os.is_empty() || when.os.iter().any(|os| *os == env.os))
            && (when.arch.is_empty() || when.arch.iter().any(|arch| *arch == env.arch))
            && when.executables.iter().all(|exe| env.has_executable(exe))
            && self
                .match_env
                .iter()
                .all(|m| env.var(&m.var).is_some_and(|v| v.contains(&m.contains)))
    }
}

impl PostAction {
    /// Create a post action from a command vector
    pub fn new(command: &[&str], description: impl Into<String>) -> Self {
        Self {
            command: command.iter().map(ToString::to_string).collect(),
            description: description.into(),
            ignore_error: false,
            env: BTreeMap::new(),
        }
    }

    /// Do not warn when the command fails
    #[must_use]
    pub fn ignoring_errors(mut self) -> Self {
        self.ignore_error = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_conditions_always_applies() {
        let filter = CompatibilityFilter::new("asdf", "nodejs");
        assert!(filter.applies(&EnvSnapshot::new("linux", "x86_64")));
    }

    #[test]
    fn test_os_and_arch_conditions() {
        let filter = CompatibilityFilter::new("asdf", "ruby")
            .on_os(&["macos"])
            .on_arch(&["aarch64"]);

        assert!(filter.applies(&EnvSnapshot::new("macos", "aarch64")));
        assert!(!filter.applies(&EnvSnapshot::new("macos", "x86_64")));
        assert!(!filter.applies(&EnvSnapshot::new("linux", "aarch64")));
    }

    #[test]
    fn test_env_substring_condition() {
        let filter =
            CompatibilityFilter::new("asdf", "python").when_env_contains("CONDA_PREFIX", "conda");

        let env = EnvSnapshot::new("linux", "x86_64");
        assert!(!filter.applies(&env));
        assert!(filter.applies(&env.with_var("CONDA_PREFIX", "/opt/miniconda3")));
    }

    #[test]
    fn test_wildcard_plugin_matches() {
        let filter = CompatibilityFilter::new("asdf", ANY_PLUGIN);
        assert!(filter.matches("asdf", "golang"));
        assert!(!filter.matches("brew", "golang"));
    }

    #[test]
    fn test_deserialize_user_filter() {
        let filter: CompatibilityFilter = toml::from_str(
            r#"
            manager = "asdf"
            plugin = "nodejs"
            kind = "conflict"
            warning = "volta manages node here"
            env = { COREPACK_ENABLE_STRICT = "1" }
            when = { os = ["linux"] }
            match_env = [{ var = "SHELL", contains = "zsh" }]
            post = [{ command = ["corepack", "enable"], description = "enable corepack", ignore_error = true }]
            "#,
        )
        .unwrap();

        assert_eq!(filter.kind, FilterKind::Conflict);
        assert_eq!(filter.when.os, vec!["linux".to_string()]);
        assert_eq!(filter.post[0].command, vec!["corepack", "enable"]);
        assert!(filter.post[0].ignore_error);
    }
}
