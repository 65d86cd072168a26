//! APT package manager (Debian/Ubuntu)

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::{ManagerKind, UpgradablePackage};
use crate::versions::package_change;

/// Counts from the `N upgraded, N newly installed, N to remove` summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeSummary {
    pub upgraded: u32,
    pub newly_installed: u32,
    pub removed: u32,
}

fn sudo_apt<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("sudo").arg("apt").args(args)
}

/// Parse `apt list --upgradable` output
///
/// Lines look like
/// `vim/now 2:8.2.2434-3+deb11u1 amd64 [upgradable from: 2:8.2.2434-3]`.
#[must_use]
pub fn parse_upgradable(output: &str) -> Vec<UpgradablePackage> {
    let mut packages = Vec::new();

    for line in output.lines() {
        if line.is_empty() || line.starts_with("Listing") || line.starts_with("WARNING") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let (name, arch) = match parts[0].split_once('/') {
            Some((name, _suite)) => (name, parts.get(2).copied()),
            None => (parts[0], None),
        };

        let current_version = line
            .split_once("[upgradable from: ")
            .and_then(|(_, rest)| rest.split_once(']'))
            .map_or("unknown", |(version, _)| version);

        let mut pkg = UpgradablePackage::new(name, current_version, parts[1]);
        if let Some(arch) = arch {
            pkg = pkg.with_arch(arch);
        }
        packages.push(pkg);
    }

    packages
}

/// Parse the upgrade summary line from `apt upgrade` output
#[must_use]
pub fn parse_upgrade_summary(output: &str) -> Option<UpgradeSummary> {
    let line = output.lines().find(|line| line.contains("upgraded,"))?;
    let mut summary = UpgradeSummary::default();

    for part in line.split(',').map(str::trim) {
        let count = |suffix: &str| {
            part.find(suffix)
                .and_then(|n| part[..n].trim().parse::<u32>().ok())
        };
        if let Some(n) = count(" upgraded") {
            summary.upgraded = n;
        }
        if let Some(n) = count(" newly installed") {
            summary.newly_installed = n;
        }
        if let Some(n) = count(" to remove") {
            summary.removed = n;
        }
    }

    Some(summary)
}

/// APT update routine: refresh lists, then upgrade
#[derive(Debug, Default)]
pub struct AptRoutine;

impl AptRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        ctx.step(unit, "update", "refresh", sudo_apt(["update"])).await?;

        if !ctx.options.strategy.upgrades() {
            unit.push_action("skip:strategy");
            return Ok(());
        }

        match ctx.query(&CommandSpec::new("apt").args(["list", "--upgradable"])).await {
            Ok(listed) if listed.success() => {
                let packages = parse_upgradable(&listed.stdout);
                debug!(count = packages.len(), "found upgradable packages");
                for pkg in packages {
                    ctx.record_change(package_change(
                        ManagerKind::Apt,
                        &pkg.name,
                        &pkg.current_version,
                        &pkg.new_version,
                    ));
                }
            }
            Ok(listed) => debug!(error = %listed.failure_summary(), "apt list unavailable"),
            Err(PackageError::Cancelled) => return Err(PackageError::Cancelled),
            Err(e) => debug!(error = %e, "apt list unavailable"),
        }

        let upgraded = ctx.step(unit, "upgrade", "upgrade", sudo_apt(["upgrade", "-y"])).await?;
        if let Some(result) = upgraded
            && let Some(summary) = parse_upgrade_summary(&result.combined_output())
        {
            info!(
                upgraded = summary.upgraded,
                newly_installed = summary.newly_installed,
                removed = summary.removed,
                "apt upgrade completed"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for AptRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Apt
    }

    #[instrument(skip(self, ctx), fields(manager = "apt"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("apt")?;

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit).await;
        ctx.finish_unit(unit, outcome)
    }
}
