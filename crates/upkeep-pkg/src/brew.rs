//! Homebrew (macOS, Linuxbrew)

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument};
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::{ManagerKind, UpgradablePackage};
use crate::versions::package_change;

/// `name (installed) < candidate [pinned at ...]`
const OUTDATED_PATTERN: &str = r"^(\S+)\s+\(([^)]+)\)\s+<\s+([^\s\[]+)";

fn brew<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("brew").args(args)
}

/// Parse `brew outdated --verbose` output
///
/// # Errors
/// Returns `PackageError::ParseError` if the pattern fails to compile
pub fn parse_outdated(output: &str) -> Result<Vec<UpgradablePackage>, PackageError> {
    let re = Regex::new(OUTDATED_PATTERN).map_err(|e| PackageError::ParseError(e.to_string()))?;

    Ok(output
        .lines()
        .map(str::trim)
        .filter_map(|line| re.captures(line))
        .map(|caps| {
            // brew lists every installed version, comma separated
            let installed = caps[2].split(',').next_back().unwrap_or(&caps[2]).trim();
            UpgradablePackage::new(&caps[1], installed, &caps[3])
        })
        .collect())
}

/// Extract the freed amount from `brew cleanup` output (e.g. `1.2GB`)
#[must_use]
pub fn parse_cleanup_freed(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.split("freed approximately ").nth(1)?;
        rest.split_whitespace().next().map(ToString::to_string)
    })
}

/// Homebrew update routine: update, upgrade, cleanup
#[derive(Debug, Default)]
pub struct BrewRoutine;

impl BrewRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        ctx.step(unit, "update", "refresh", brew(["update"])).await?;

        self.track_outdated(ctx, unit).await?;

        if ctx.options.strategy.upgrades() {
            ctx.step(unit, "upgrade", "upgrade", brew(["upgrade"])).await?;
        } else {
            unit.push_action("skip:strategy");
        }

        let cleanup = ctx.step(unit, "cleanup", "cleanup", brew(["cleanup"])).await;
        if let Some(Some(result)) = ctx.tolerate(unit, cleanup)?
            && let Some(freed) = parse_cleanup_freed(&result.stdout)
        {
            info!(freed = %freed, "brew cleanup");
        }

        Ok(())
    }

    async fn track_outdated(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        let result = match ctx.query(&brew(["outdated", "--verbose"])).await {
            Ok(result) => result,
            Err(PackageError::Cancelled) => return Err(PackageError::Cancelled),
            Err(e) => {
                debug!(error = %e, "brew outdated unavailable");
                return Ok(());
            }
        };

        match parse_outdated(&result.stdout) {
            Ok(packages) => {
                for pkg in packages {
                    ctx.record_change(package_change(
                        ManagerKind::Brew,
                        &pkg.name,
                        &pkg.current_version,
                        &pkg.new_version,
                    ));
                }
            }
            Err(e) => ctx.warn(unit, format!("could not parse brew outdated: {e}")),
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for BrewRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Brew
    }

    #[instrument(skip(self, ctx), fields(manager = "brew"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("brew")?;

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit).await;
        ctx.finish_unit(unit, outcome)
    }
}
