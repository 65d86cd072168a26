//! Compatibility filter chain
//!
//! Filters are pure configuration: a built-in table plus an optional user
//! overlay, merged once at startup. For a (manager, plugin) pair the chain
//! is the ordered list of applicable filters, built-ins first, from which
//! warnings, environment, post actions and the conflict count derive.

mod builtin;
mod filter;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use upkeep_api::CompatMode;

use crate::env::EnvSnapshot;
use crate::error::PackageError;

pub use filter::{ANY_PLUGIN, CompatibilityFilter, Conditions, EnvMatch, FilterKind, PostAction};

/// User filter document (`[[filters]]` tables)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDocument {
    #[serde(default)]
    pub filters: Vec<CompatibilityFilter>,
}

impl FilterDocument {
    /// Parse a TOML filter document
    ///
    /// # Errors
    /// Returns `PackageError::ConfigError` if the document is malformed
    pub fn from_toml(content: &str) -> Result<Self, PackageError> {
        toml::from_str(content).map_err(|e| PackageError::ConfigError(e.to_string()))
    }
}

/// The merged filter table for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<CompatibilityFilter>,
}

impl FilterSet {
    /// Built-in filters only
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            filters: builtin::builtin_filters(),
        }
    }

    /// No filters at all
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append user filters after the current ones
    ///
    /// Later filters win on environment key collisions.
    #[must_use]
    pub fn with_overlay(mut self, overlay: FilterDocument) -> Self {
        self.filters.extend(overlay.filters);
        self
    }

    /// Number of filters in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applicable filters for a (manager, plugin) pair
    ///
    /// `off` mode consults no filters.
    #[must_use]
    pub fn chain(
        &self,
        manager: &str,
        plugin: &str,
        mode: CompatMode,
        env: &EnvSnapshot,
    ) -> FilterChain<'_> {
        let filters = if mode.enabled() {
            self.filters
                .iter()
                .filter(|f| f.matches(manager, plugin) && f.applies(env))
                .collect()
        } else {
            Vec::new()
        };
        FilterChain { filters }
    }
}

/// Ordered applicable filters for one sub-unit
#[derive(Debug, Clone, Default)]
pub struct FilterChain<'a> {
    filters: Vec<&'a CompatibilityFilter>,
}

impl<'a> FilterChain<'a> {
    /// Whether no filter applies
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applicable filters in order
    pub fn iter(&self) -> impl Iterator<Item = &'a CompatibilityFilter> + '_ {
        self.filters.iter().copied()
    }

    /// Union of warning strings, first occurrence order
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = Vec::new();
        for warning in self.filters.iter().filter_map(|f| f.warning.as_ref()) {
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }
        warnings
    }

    /// Merged environment; later filters win on key collision
    #[must_use]
    pub fn merged_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for filter in &self.filters {
            for (k, v) in &filter.env {
                env.insert(k.clone(), v.clone());
            }
        }
        env
    }

    /// Flattened post actions in filter order
    #[must_use]
    pub fn post_actions(&self) -> Vec<&'a PostAction> {
        self.filters.iter().flat_map(|f| f.post.iter()).collect()
    }

    /// Number of applicable conflict filters
    #[must_use]
    pub fn conflict_count(&self) -> u32 {
        let count = self
            .filters
            .iter()
            .filter(|f| f.kind == FilterKind::Conflict)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::testing::touch_executable;

    fn linux() -> EnvSnapshot {
        EnvSnapshot::new("linux", "x86_64")
    }

    #[test]
    fn test_user_overlay_overrides_env_key() {
        let overlay = FilterDocument::from_toml(
            r#"
            [[filters]]
            manager = "asdf"
            plugin = "golang"
            env = { GOTOOLCHAIN = "auto" }
            "#,
        )
        .unwrap();
        let builtin_only = FilterSet::builtin();
        let merged = FilterSet::builtin().with_overlay(overlay);

        let before = builtin_only.chain("asdf", "golang", CompatMode::Auto, &linux());
        assert_eq!(before.merged_env()["GOTOOLCHAIN"], "local");

        let after = merged.chain("asdf", "golang", CompatMode::Auto, &linux());
        assert_eq!(after.merged_env()["GOTOOLCHAIN"], "auto");
    }

    #[test]
    fn test_overlay_keeps_unrelated_builtin_keys() {
        let set = FilterSet::empty()
            .with_overlay(FilterDocument {
                filters: vec![
                    CompatibilityFilter::new("asdf", "ruby")
                        .with_env("RUBY_CONFIGURE_OPTS", "--builtin")
                        .with_env("RUBY_BUILD_CACHE", "1"),
                ],
            })
            .with_overlay(FilterDocument {
                filters: vec![
                    CompatibilityFilter::new("asdf", "ruby").with_env("RUBY_CONFIGURE_OPTS", "--user"),
                ],
            });

        let env = set.chain("asdf", "ruby", CompatMode::Auto, &linux()).merged_env();
        assert_eq!(env["RUBY_CONFIGURE_OPTS"], "--user");
        assert_eq!(env["RUBY_BUILD_CACHE"], "1");
    }

    #[test]
    fn test_off_mode_consults_nothing() {
        let set = FilterSet::builtin();
        let chain = set.chain("asdf", "golang", CompatMode::Off, &linux());
        assert!(chain.is_empty());
        assert!(chain.merged_env().is_empty());
    }

    #[test]
    fn test_conflict_requires_companion_executable() {
        let dir = tempfile::tempdir().unwrap();
        let set = FilterSet::builtin();
        let env = linux().with_var("PATH", dir.path().to_string_lossy());

        let chain = set.chain("asdf", "nodejs", CompatMode::Strict, &env);
        assert_eq!(chain.conflict_count(), 0);

        touch_executable(dir.path(), "volta");
        touch_executable(dir.path(), "corepack");
        let chain = set.chain("asdf", "nodejs", CompatMode::Strict, &env);
        assert_eq!(chain.conflict_count(), 1);
        assert_eq!(chain.warnings().len(), 2);
        assert_eq!(chain.post_actions()[0].description, "enable corepack");
    }

    #[test]
    fn test_warnings_are_deduplicated() {
        let set = FilterSet::empty().with_overlay(FilterDocument {
            filters: vec![
                CompatibilityFilter::new("pip", ANY_PLUGIN).with_warning("same"),
                CompatibilityFilter::new("pip", "requests").with_warning("same"),
            ],
        });
        let chain = set.chain("pip", "requests", CompatMode::Auto, &linux());
        assert_eq!(chain.warnings(), vec!["same".to_string()]);
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let err = FilterDocument::from_toml("[[filters]]\nmanager = 3").unwrap_err();
        assert!(matches!(err, PackageError::ConfigError(_)));
    }
}
