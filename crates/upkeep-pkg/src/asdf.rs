//! asdf version manager
//!
//! Plugins are the sub-units. Each plugin is run through the compatibility
//! filter chain before anything is installed for it, and the merged filter
//! environment is applied to that plugin's install command.

use async_trait::async_trait;
use tracing::{debug, instrument};
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::ManagerKind;
use crate::versions::package_change;

fn asdf<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("asdf").args(args)
}

/// Parse `asdf plugin list` output into plugin names
#[must_use]
pub fn parse_plugin_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with('*'))
        .map(ToString::to_string)
        .collect()
}

/// Parse `asdf current <plugin>` output (`nodejs 20.11.0 (set by ...)`)
#[must_use]
pub fn parse_current_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::split_whitespace)
        .filter_map(|mut fields| {
            let _name = fields.next()?;
            fields.next().map(ToString::to_string)
        })
        .find(|version| version != "Version")
}

/// Parse `asdf latest <plugin>` output
#[must_use]
pub fn parse_latest_version(output: &str) -> Option<String> {
    let latest = output.trim();
    (!latest.is_empty() && !latest.contains(char::is_whitespace)).then(|| latest.to_string())
}

/// asdf update routine: plugin update, then per-plugin install
#[derive(Debug, Default)]
pub struct AsdfRoutine;

impl AsdfRoutine {
    /// Current and latest version of a plugin; `None` when unknown
    async fn versions(
        &self,
        ctx: &RoutineContext<'_>,
        plugin: &str,
    ) -> Result<Option<(String, String)>, PackageError> {
        let latest = ctx.query(&asdf(["latest", plugin])).await?;
        if !latest.success() {
            return Ok(None);
        }
        let current = ctx.query(&asdf(["current", plugin])).await?;
        if !current.success() {
            return Ok(None);
        }

        Ok(parse_current_version(&current.stdout).zip(parse_latest_version(&latest.stdout)))
    }

    /// Process one plugin
    ///
    /// Returns `Err` only for cancellation and strict-mode conflicts; the
    /// unit is stored either way.
    async fn update_plugin(
        &self,
        ctx: &mut RoutineContext<'_>,
        plugin: &str,
    ) -> Result<(), PackageError> {
        let mut unit = PluginResult::new(plugin);
        let screened = match ctx.screen(&mut unit) {
            Ok(screened) => screened,
            Err(e) => return ctx.finish_unit(unit, Err(e)),
        };

        if !ctx.options.strategy.upgrades() {
            unit.push_action("skip:strategy");
            return ctx.finish_unit(unit, Ok(()));
        }

        let versions = match self.versions(ctx, plugin).await {
            Ok(versions) => versions,
            Err(PackageError::Cancelled) => return ctx.finish_unit(unit, Err(PackageError::Cancelled)),
            Err(e) => {
                debug!(plugin, error = %e, "version check failed");
                None
            }
        };

        let up_to_date = match &versions {
            Some((current, latest)) if current == latest => true,
            Some((current, latest)) => {
                ctx.record_change(package_change(ManagerKind::Asdf, plugin, current, latest));
                false
            }
            None => false,
        };

        if up_to_date {
            unit.push_action("skip:latest");
        } else {
            let cmd = asdf(["install", plugin, "latest"]).envs(&screened.env);
            match ctx.step(&mut unit, "install", "install:latest", cmd).await {
                Ok(_) => {}
                Err(PackageError::Cancelled) => {
                    return ctx.finish_unit(unit, Err(PackageError::Cancelled));
                }
                Err(e) => {
                    // recorded on the unit; the next plugin still runs
                    ctx.warn(&mut unit, format!("failed to install latest {plugin}"));
                    unit.error = Some(e.to_string());
                    ctx.result.add_plugin(unit);
                    return Ok(());
                }
            }
        }

        // post actions are idempotent and also run for up-to-date plugins
        let outcome = ctx.post_actions(&mut unit, &screened.post).await;
        ctx.finish_unit(unit, outcome)
    }
}

#[async_trait]
impl UpdateRoutine for AsdfRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Asdf
    }

    #[instrument(skip(self, ctx), fields(manager = "asdf"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("asdf")?;

        let mut unit = ctx.manager_unit();
        let refreshed = ctx
            .step(&mut unit, "plugin_update", "refresh", asdf(["plugin", "update", "--all"]))
            .await
            .map(|_| ());
        ctx.finish_unit(unit, refreshed)?;

        ctx.start_step("version_check");
        let listed = ctx.query(&asdf(["plugin", "list"])).await?;
        if !listed.success() {
            let err = PackageError::CommandFailed {
                step: "asdf plugin list".to_string(),
                message: listed.failure_summary(),
            };
            ctx.fail_step("version_check", &err.to_string());
            return Err(err);
        }
        let plugins = parse_plugin_list(&listed.stdout);
        ctx.complete_step("version_check", plugins.len());

        for plugin in &plugins {
            self.update_plugin(ctx, plugin).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use upkeep_api::{CompatMode, ManagerStatus, UpdateType};

    use super::*;
    use crate::compat::{CompatibilityFilter, FilterDocument, FilterSet, PostAction};
    use crate::testing::{Harness, ScriptedExecutor, env_with};

    #[test]
    fn test_parse_plugin_list() {
        let plugins = parse_plugin_list("nodejs\npython   https://github.com/asdf-community/asdf-python\n\n");
        assert_eq!(plugins, vec!["nodejs", "python"]);
        assert!(parse_plugin_list("*Please install a plugin first").is_empty());
    }

    #[test]
    fn test_parse_current_version() {
        assert_eq!(
            parse_current_version("nodejs 20.11.0 (set by /home/dev/.tool-versions)").as_deref(),
            Some("20.11.0")
        );
        assert_eq!(
            parse_current_version("Name    Version   Source\nnodejs  22.1.0    /home/dev/.tool-versions\n")
                .as_deref(),
            Some("22.1.0")
        );
        assert_eq!(parse_current_version("nodejs"), None);
    }

    #[test]
    fn test_parse_latest_version() {
        assert_eq!(parse_latest_version("20.12.0\n").as_deref(), Some("20.12.0"));
        assert_eq!(parse_latest_version("  \n"), None);
    }

    fn harness(dir: &tempfile::TempDir) -> Harness {
        Harness::new(ManagerKind::Asdf, env_with(dir, "linux", &["asdf"]))
    }

    #[tokio::test]
    async fn test_installs_outdated_and_skips_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        let exec = ScriptedExecutor::new()
            .respond("asdf plugin list", 0, "nodejs\ngolang\n")
            .respond("asdf latest nodejs", 0, "20.12.0\n")
            .respond("asdf current nodejs", 0, "nodejs 20.11.0 (set by ~/.tool-versions)\n")
            .respond("asdf latest golang", 0, "1.22.1\n")
            .respond("asdf current golang", 0, "golang 1.22.1 (set by ~/.tool-versions)\n");

        AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap();

        let plugins = &harness.result.plugins;
        assert_eq!(plugins[0].name, "asdf");
        assert_eq!(plugins[0].actions, vec!["refresh"]);
        assert_eq!(plugins[1].actions, vec!["install:latest"]);
        assert_eq!(plugins[2].actions, vec!["skip:latest"]);
        assert_eq!(plugins[2].env_applied["GOTOOLCHAIN"], "local");
        assert!(!exec.calls().contains(&"asdf install golang latest".to_string()));

        let changes = harness.tracker.changes(ManagerKind::Asdf);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].update_type, UpdateType::Minor);
    }

    #[tokio::test]
    async fn test_install_env_comes_from_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        let exec = ScriptedExecutor::new().respond("asdf plugin list", 0, "golang\n");

        AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap();

        let env = exec.last_env("asdf install golang latest").unwrap();
        assert_eq!(env["GOTOOLCHAIN"], "local");
    }

    #[tokio::test]
    async fn test_strict_conflict_aborts_routine() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        harness.options.compat = CompatMode::Strict;
        harness.filters = FilterSet::builtin().with_overlay(FilterDocument {
            filters: vec![CompatibilityFilter::new("asdf", "nodejs").conflict()],
        });
        let exec = ScriptedExecutor::new().respond("asdf plugin list", 0, "nodejs\npython\n");

        let err = AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap_err();

        assert!(matches!(err, PackageError::StrictConflict { ref plugin, .. } if plugin == "nodejs"));
        let plugins = &harness.result.plugins;
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[1].conflicts, 1);
        assert!(plugins[1].error.as_deref().unwrap().contains("mode=strict"));
        assert!(exec.calls().iter().all(|c| !c.contains("python")));
        assert!(exec.calls().iter().all(|c| !c.starts_with("asdf install")));
    }

    #[tokio::test]
    async fn test_auto_conflict_warns_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        harness.filters = FilterSet::empty().with_overlay(FilterDocument {
            filters: vec![CompatibilityFilter::new("asdf", "nodejs").conflict()],
        });
        let exec = ScriptedExecutor::new().respond("asdf plugin list", 0, "nodejs\n");

        AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap();

        let nodejs = &harness.result.plugins[1];
        assert_eq!(nodejs.conflicts, 1);
        assert_eq!(nodejs.warnings.len(), 1);
        assert_eq!(nodejs.actions, vec!["install:latest"]);
    }

    #[tokio::test]
    async fn test_failed_install_degrades_to_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        let exec = ScriptedExecutor::new()
            .respond("asdf plugin list", 0, "ruby\npython\n")
            .respond_err("asdf install ruby latest", 1, "BUILD FAILED");

        AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap();

        assert_eq!(harness.result.status, ManagerStatus::Partial);
        assert!(harness.result.plugins[1].error.is_some());
        assert_eq!(harness.result.plugins[2].actions, vec!["install:latest"]);
    }

    #[tokio::test]
    async fn test_dry_run_runs_no_installs() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        harness.options.dry_run = true;
        harness.filters = FilterSet::empty().with_overlay(FilterDocument {
            filters: vec![CompatibilityFilter::new("asdf", "nodejs").with_post(
                PostAction::new(&["corepack", "enable"], "enable corepack"),
            )],
        });
        let exec = ScriptedExecutor::new().respond("asdf plugin list", 0, "nodejs\n");

        AsdfRoutine.run(&mut harness.context(&exec)).await.unwrap();

        assert!(exec.calls().iter().all(|c| !c.starts_with("asdf install")));
        assert!(!exec.calls().contains(&"asdf plugin update --all".to_string()));
        assert_eq!(
            harness.result.plugins[1].actions,
            vec!["would:install:latest", "would:post:enable corepack"]
        );
    }
}
