//! pip (Python)
//!
//! Every outdated package is its own sub-unit. Inside an active conda or
//! mamba environment the routine does nothing unless explicitly allowed.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use upkeep_api::{PackageChange, PluginResult};
use upkeep_exec::CommandSpec;

use crate::env::EnvSnapshot;
use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::ManagerKind;
use crate::versions::{package_change, placeholder_change};

/// A way of invoking pip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipCommand {
    pub program: &'static str,
    pub prefix: &'static [&'static str],
}

impl PipCommand {
    /// Base command to append pip arguments to
    #[must_use]
    pub fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program).args(self.prefix.iter().copied())
    }

    fn with<const N: usize>(&self, args: [&str; N]) -> CommandSpec {
        self.command().args(args)
    }
}

/// Discovery order
pub const PIP_CANDIDATES: [PipCommand; 4] = [
    PipCommand { program: "python3", prefix: &["-m", "pip"] },
    PipCommand { program: "python", prefix: &["-m", "pip"] },
    PipCommand { program: "pip3", prefix: &[] },
    PipCommand { program: "pip", prefix: &[] },
];

/// Active conda-family environment, if any (`conda` or `mamba`)
#[must_use]
pub fn detect_conda(env: &EnvSnapshot) -> Option<&'static str> {
    if env.var("CONDA_PREFIX").is_some() || env.var("CONDA_DEFAULT_ENV").is_some() {
        if env.has_executable("mamba") || env.has_executable("micromamba") {
            return Some("mamba");
        }
        return Some("conda");
    }
    env.var("MAMBA_ROOT_PREFIX").map(|_| "mamba")
}

#[derive(Debug, Deserialize)]
struct OutdatedEntry {
    name: String,
    version: String,
    latest_version: String,
}

/// Parse `pip list --outdated --format=json`
///
/// # Errors
/// Returns `PackageError::ParseError` if the output is not the expected JSON
pub fn parse_outdated_json(output: &str) -> Result<Vec<PackageChange>, PackageError> {
    let entries: Vec<OutdatedEntry> =
        serde_json::from_str(output).map_err(|e| PackageError::ParseError(e.to_string()))?;
    Ok(entries
        .iter()
        .map(|e| package_change(ManagerKind::Pip, &e.name, &e.version, &e.latest_version))
        .collect())
}

/// Parse `pip list --outdated --format=freeze` (`name==installed`)
///
/// Freeze output carries no target version, so changes use the
/// `latest` placeholder.
#[must_use]
pub fn parse_outdated_freeze(output: &str) -> Vec<PackageChange> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (name, version) = line.split_once("==").unwrap_or((line, ""));
            placeholder_change(ManagerKind::Pip, name, version)
        })
        .collect()
}

/// pip update routine
#[derive(Debug, Default)]
pub struct PipRoutine;

impl PipRoutine {
    async fn discover(&self, ctx: &RoutineContext<'_>) -> Result<PipCommand, PackageError> {
        for candidate in PIP_CANDIDATES {
            if !ctx.env.has_executable(candidate.program) {
                continue;
            }
            match ctx.query(&candidate.with(["--version"])).await {
                Ok(result) if result.success() => return Ok(candidate),
                Ok(_) => {}
                Err(PackageError::Cancelled) => return Err(PackageError::Cancelled),
                Err(e) => debug!(program = candidate.program, error = %e, "pip probe failed"),
            }
        }
        Err(PackageError::ManagerNotFound(ManagerKind::Pip.to_string()))
    }

    async fn outdated(
        &self,
        ctx: &RoutineContext<'_>,
        pip: PipCommand,
    ) -> Result<Vec<PackageChange>, PackageError> {
        let json = ctx
            .query(&pip.with(["list", "--outdated", "--format=json"]))
            .await?;
        if json.success() {
            match parse_outdated_json(&json.stdout) {
                Ok(changes) => return Ok(changes),
                Err(e) => debug!(error = %e, "falling back to freeze format"),
            }
        }

        let freeze_cmd = pip.with(["list", "--outdated", "--format=freeze"]);
        let freeze = ctx.query(&freeze_cmd).await?;
        if !freeze.success() {
            return Err(PackageError::CommandFailed {
                step: freeze_cmd.to_string(),
                message: freeze.failure_summary(),
            });
        }
        Ok(parse_outdated_freeze(&freeze.stdout))
    }

    /// Upgrade pip and list outdated packages
    async fn prepare(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
        pip: PipCommand,
    ) -> Result<Vec<String>, PackageError> {
        let upgraded = ctx
            .step(unit, "upgrade_pip", "install:pip", pip.with(["install", "--upgrade", "pip"]))
            .await;
        ctx.tolerate(unit, upgraded)?;

        if !ctx.options.strategy.upgrades() {
            unit.push_action("skip:strategy");
            return Ok(Vec::new());
        }

        ctx.start_step("check_outdated");
        let changes = match self.outdated(ctx, pip).await {
            Ok(changes) => changes,
            Err(e) => {
                ctx.fail_step("check_outdated", &e.to_string());
                return Err(e);
            }
        };
        ctx.complete_step("check_outdated", changes.len());

        let names = changes.iter().map(|c| c.name.clone()).collect();
        for change in changes {
            ctx.record_change(change);
        }
        Ok(names)
    }

    async fn upgrade_package(
        &self,
        ctx: &mut RoutineContext<'_>,
        pip: PipCommand,
        name: &str,
    ) -> Result<(), PackageError> {
        let mut unit = PluginResult::new(name);
        let screened = match ctx.screen(&mut unit) {
            Ok(screened) => screened,
            Err(e) => return ctx.finish_unit(unit, Err(e)),
        };

        let tag = format!("install:{name}");
        let cmd = pip.with(["install", "--upgrade", name]).envs(&screened.env);
        match ctx.step(&mut unit, "upgrade_packages", &tag, cmd).await {
            Ok(_) => {}
            Err(PackageError::Cancelled) => {
                return ctx.finish_unit(unit, Err(PackageError::Cancelled));
            }
            Err(e) => {
                ctx.warn(&mut unit, format!("failed to upgrade {name}"));
                unit.error = Some(e.to_string());
                ctx.result.add_plugin(unit);
                return Ok(());
            }
        }

        let outcome = ctx.post_actions(&mut unit, &screened.post).await;
        ctx.finish_unit(unit, outcome)
    }
}

#[async_trait]
impl UpdateRoutine for PipRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Pip
    }

    fn is_installed(&self, env: &EnvSnapshot) -> bool {
        PIP_CANDIDATES
            .iter()
            .any(|candidate| env.has_executable(candidate.program))
    }

    #[instrument(skip(self, ctx), fields(manager = "pip"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        let pip = self.discover(ctx).await?;
        debug!(command = %pip.command(), "using pip");

        let mut unit = ctx.manager_unit();

        if let Some(kind) = detect_conda(ctx.env)
            && !ctx.options.pip_allow_conda
        {
            unit.push_action("skip:conda");
            ctx.warn(
                &mut unit,
                format!(
                    "{kind} environment detected; skipping pip updates (use `{kind} update --all` instead)"
                ),
            );
            return ctx.finish_unit(unit, Ok(()));
        }

        let prepared = self.prepare(ctx, &mut unit, pip).await;
        let packages = match prepared {
            Ok(packages) => {
                ctx.finish_unit(unit, Ok(()))?;
                packages
            }
            Err(e) => return ctx.finish_unit(unit, Err(e)),
        };

        info!(count = packages.len(), "outdated pip packages");
        for name in &packages {
            self.upgrade_package(ctx, pip, name).await?;
        }
        Ok(())
    }
}
