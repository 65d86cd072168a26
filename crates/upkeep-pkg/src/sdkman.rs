//! SDKMAN! (JVM candidates)
//!
//! `sdk` is a shell function, so every command sources the init script
//! inside a bash subshell.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::instrument;
use upkeep_api::PluginResult;
use upkeep_exec::CommandSpec;

use crate::env::EnvSnapshot;
use crate::error::PackageError;
use crate::traits::{RoutineContext, UpdateRoutine};
use crate::types::ManagerKind;

/// `bash -c 'source "$1" && sdk <subcommand>' sdkman <dir>/bin/sdkman-init.sh`
///
/// The init script path travels as a positional parameter and is never
/// spliced into the script text.
#[must_use]
pub fn sdk_command(sdkman_dir: &Path, subcommand: &str) -> CommandSpec {
    let init = sdkman_dir.join("bin").join("sdkman-init.sh");
    CommandSpec::new("bash")
        .arg("-c")
        .arg(format!("source \"$1\" && sdk {subcommand}"))
        .arg("sdkman")
        .arg(init.to_string_lossy())
}

fn installed_dir(env: &EnvSnapshot) -> Option<PathBuf> {
    env.sdkman_dir().filter(|dir| dir.is_dir())
}

/// SDKMAN update routine: selfupdate, then candidate refresh
#[derive(Debug, Default)]
pub struct SdkmanRoutine;

impl SdkmanRoutine {
    async fn update(
        &self,
        ctx: &mut RoutineContext<'_>,
        unit: &mut PluginResult,
        dir: &Path,
    ) -> Result<(), PackageError> {
        let selfupdate = ctx
            .step(unit, "selfupdate", "refresh", sdk_command(dir, "selfupdate"))
            .await;
        ctx.tolerate(unit, selfupdate)?;

        if ctx.options.strategy.upgrades() {
            let candidates = ctx
                .step(unit, "update", "upgrade", sdk_command(dir, "update"))
                .await;
            ctx.tolerate(unit, candidates)?;
        } else {
            unit.push_action("skip:strategy");
        }

        Ok(())
    }
}

#[async_trait]
impl UpdateRoutine for SdkmanRoutine {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Sdkman
    }

    fn is_installed(&self, env: &EnvSnapshot) -> bool {
        installed_dir(env).is_some()
    }

    #[instrument(skip(self, ctx), fields(manager = "sdkman"))]
    async fn run(&self, ctx: &mut RoutineContext<'_>) -> Result<(), PackageError> {
        let Some(dir) = installed_dir(ctx.env) else {
            return Err(PackageError::ManagerNotFound(ManagerKind::Sdkman.to_string()));
        };

        let mut unit = ctx.manager_unit();
        let outcome = self.update(ctx, &mut unit, &dir).await;
        ctx.finish_unit(unit, outcome)
    }
}

#[cfg(test)]
mod tests {
    use upkeep_api::ManagerStatus;

    use super::*;
    use crate::testing::{Harness, ScriptedExecutor};

    fn harness(dir: &tempfile::TempDir) -> Harness {
        let env = EnvSnapshot::new("linux", "x86_64")
            .with_var("SDKMAN_DIR", dir.path().to_string_lossy());
        Harness::new(ManagerKind::Sdkman, env)
    }

    #[test]
    fn test_sdk_command_sources_init_script() {
        let cmd = sdk_command(Path::new("/home/dev/.sdkman"), "selfupdate");
        assert_eq!(
            cmd.args,
            vec![
                "-c",
                "source \"$1\" && sdk selfupdate",
                "sdkman",
                "/home/dev/.sdkman/bin/sdkman-init.sh",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_init_path_is_not_interpreted_by_the_shell() {
        use upkeep_exec::{CommandExecutor, LocalExecutor};

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("my sdk; echo injected");
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::write(
            dir.join("bin/sdkman-init.sh"),
            "sdk() { echo \"sdk $*\"; }\n",
        )
        .unwrap();

        let result = LocalExecutor::new()
            .run(&sdk_command(&dir, "selfupdate"))
            .await
            .unwrap();

        assert!(result.success(), "{}", result.stderr);
        assert_eq!(result.stdout.trim(), "sdk selfupdate");
    }

    #[test]
    fn test_home_fallback() {
        let home = tempfile::tempdir().unwrap();
        let env = EnvSnapshot::new("linux", "x86_64").with_home(home.path());
        assert!(!SdkmanRoutine.is_installed(&env));

        std::fs::create_dir(home.path().join(".sdkman")).unwrap();
        assert!(SdkmanRoutine.is_installed(&env));
    }

    #[tokio::test]
    async fn test_selfupdate_failure_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        let selfupdate = sdk_command(dir.path(), "selfupdate").to_string();
        let exec = ScriptedExecutor::new().respond_err(&selfupdate, 1, "network unreachable");

        SdkmanRoutine.run(&mut harness.context(&exec)).await.unwrap();

        let unit = &harness.result.plugins[0];
        assert_eq!(unit.actions, vec!["upgrade"]);
        assert_eq!(unit.warnings.len(), 1);
        assert_eq!(harness.result.status, ManagerStatus::Success);
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_found() {
        let mut harness = Harness::new(
            ManagerKind::Sdkman,
            EnvSnapshot::new("linux", "x86_64").with_var("SDKMAN_DIR", "/nonexistent/sdkman"),
        );
        let exec = ScriptedExecutor::new();

        let err = SdkmanRoutine.run(&mut harness.context(&exec)).await.unwrap_err();
        assert!(err.is_skip());
    }

    #[tokio::test]
    async fn test_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = harness(&dir);
        harness.options.dry_run = true;
        let exec = ScriptedExecutor::new();

        SdkmanRoutine.run(&mut harness.context(&exec)).await.unwrap();

        assert!(exec.calls().is_empty());
        assert_eq!(
            harness.result.plugins[0].actions,
            vec!["would:refresh", "would:upgrade"]
        );
    }
}
