//! npm global packages

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use upkeep_api::{PackageChange, PluginResult};
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::ManagerKind;
use crate::versions::package_change;

#[derive(Debug, Deserialize)]
struct OutdatedEntry {
    current: Option<String>,
    wanted: Option<String>,
    latest: Option<String>,
}

fn npm<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("npm").args(args)
}

/// Parse `npm outdated -g --depth=0 --json`
///
/// Entries without an installed version are not reported.
///
/// # Errors
/// Returns `PackageError::ParseError` if the output is not the expected JSON
pub fn parse_outdated(output: &str) -> Result<Vec<PackageChange>, PackageError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: BTreeMap<String, OutdatedEntry> =
        serde_json::from_str(output).map_err(|e| PackageError::ParseError(e.to_string()))?;

    Ok(entries
        .iter()
        .filter_map(|(name, entry)| {
            let current = entry.current.as_deref()?;
            let target = entry.latest.as_deref().or(entry.wanted.as_deref())?;
            Some(package_change(ManagerKind::Npm, name, current, target))
        })
        .collect())
}

/// npm update routine
#[derive(Debug, Default)]
pub struct NpmRoutine;

impl NpmRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        ctx.start_step("check");
        // exits non-zero whenever something is outdated
        let queried = ctx.query(&npm(["outdated", "-g", "--depth=0", "--json"])).await;
        if let Err(e) = &queried
            && !matches!(e, PackageError::Cancelled)
        {
            ctx.fail_step("check", &e.to_string());
        }
        if let Some(outdated) = ctx.tolerate(unit, queried)? {
            match parse_outdated(&outdated.stdout) {
                Ok(changes) => {
                    ctx.complete_step("check", changes.len());
                    for change in changes {
                        ctx.record_change(change);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "npm outdated output unreadable");
                    ctx.complete_step("check", 0);
                }
            }
        }

        if ctx.options.strategy.upgrades() {
            ctx.step(unit, "update", "upgrade", npm(["update", "-g"])).await?;
        } else {
            unit.push_action("skip:strategy");
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for NpmRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Npm
    }

    #[instrument(skip(self, ctx), fields(manager = "npm"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("npm")?;

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit).await;
        ctx.finish_unit(unit, outcome)
    }
}
