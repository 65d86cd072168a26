//! pacman (Arch/Manjaro)

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::{ManagerKind, UpgradablePackage};
use crate::versions::package_change;

/// Packages never removed by orphan cleanup
pub const CRITICAL_PACKAGES: &[&str] = &[
    "linux",
    "linux-lts",
    "systemd",
    "glibc",
    "bash",
    "zsh",
    "coreutils",
    "pacman",
    "util-linux",
    "filesystem",
    "shadow",
    "iproute2",
    "networkmanager",
    "sudo",
];

fn sudo_pacman<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("sudo").args(["-n", "pacman"]).args(args)
}

/// Parse `pacman -Qu` output (`name old -> new`)
#[must_use]
pub fn parse_query_upgrades(output: &str) -> Vec<UpgradablePackage> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let old = fields.next()?;
            let arrow = fields.next()?;
            let new = fields.next()?;
            (arrow == "->").then(|| UpgradablePackage::new(name, old, new))
        })
        .collect()
}

/// Orphans from `pacman -Qtdq` minus critical packages
#[must_use]
pub fn removable_orphans(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| {
            let critical = CRITICAL_PACKAGES.contains(name);
            if critical {
                debug!(package = name, "keeping critical package");
            }
            !critical
        })
        .map(ToString::to_string)
        .collect()
}

/// pacman update routine: full sync upgrade, optional orphan cleanup
#[derive(Debug, Default)]
pub struct PacmanRoutine;

impl PacmanRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        // partial upgrades are unsupported on Arch, so no bare -Sy either
        if !ctx.options.strategy.upgrades() {
            unit.push_action("skip:strategy");
            return Ok(());
        }

        self.track_upgrades(ctx).await?;

        let synced = ctx
            .step(unit, "sync_update", "upgrade", sudo_pacman(["-Syu", "--noconfirm"]))
            .await;
        ctx.tolerate(unit, synced)?;

        if ctx.options.pacman_clean_orphans {
            self.clean_orphans(ctx, unit).await?;
        } else {
            debug!("orphan cleanup disabled");
        }

        Ok(())
    }

    async fn track_upgrades(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        match ctx.query(&CommandSpec::new("pacman").arg("-Qu")).await {
            Ok(listed) => {
                for pkg in parse_query_upgrades(&listed.stdout) {
                    ctx.record_change(package_change(
                        ManagerKind::Pacman,
                        &pkg.name,
                        &pkg.current_version,
                        &pkg.new_version,
                    ));
                }
                Ok(())
            }
            Err(PackageError::Cancelled) => Err(PackageError::Cancelled),
            Err(e) => {
                debug!(error = %e, "pacman -Qu unavailable");
                Ok(())
            }
        }
    }

    async fn clean_orphans(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        let listed = match ctx.query(&CommandSpec::new("pacman").arg("-Qtdq")).await {
            Ok(listed) => listed,
            Err(PackageError::Cancelled) => return Err(PackageError::Cancelled),
            Err(e) => {
                ctx.warn(unit, format!("could not list orphan packages: {e}"));
                return Ok(());
            }
        };

        let orphans = removable_orphans(&listed.stdout);
        if orphans.is_empty() {
            info!("no orphan packages to remove");
            return Ok(());
        }

        let cmd = sudo_pacman(["-Rns", "--noconfirm"]).args(orphans);
        let removed = ctx.step(unit, "cleanup", "cleanup", cmd).await;
        ctx.tolerate(unit, removed)?;
        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for PacmanRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Pacman
    }

    #[instrument(skip(self, ctx), fields(manager = "pacman"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("pacman")?;

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit).await;
        ctx.finish_unit(unit, outcome)
    }
}
