//! yay AUR helper

use async_trait::async_trait;
use tracing::instrument;
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::ManagerKind;

fn yay<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("yay").args(args)
}

/// yay update routine: AUR upgrade, then cache cleanup
#[derive(Debug, Default)]
pub struct YayRoutine;

impl YayRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
    ) -> Result<(), PackageError> {
        if ctx.options.strategy.upgrades() {
            ctx.step(unit, "update", "upgrade", yay(["-Syu", "--noconfirm", "--needed"]))
                .await?;
        } else {
            unit.push_action("skip:strategy");
        }

        let cleaned = ctx.step(unit, "cleanup", "cleanup", yay(["-Yc", "--noconfirm"])).await;
        ctx.tolerate(unit, cleaned)?;
        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for YayRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Yay
    }

    #[instrument(skip(self, ctx), fields(manager = "yay"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        ctx.require("yay")?;

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit).await;
        ctx.finish_unit(unit, outcome)
    }
}
