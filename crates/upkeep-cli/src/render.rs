//! Human and JSON rendering
//!
//! Pure functions over progress events and the run result. Nothing here
//! touches the terminal; `main` decides where the strings go.

use std::fmt::{Display, Write as _};

use owo_colors::OwoColorize;
use upkeep_api::{
    ManagerStatus, PackageChange, ProgressEvent, ResourceReport, RunResult,
};
use upkeep_core::duplicates;
use upkeep_pkg::EnvSnapshot;

/// Terminal capabilities the renderer may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub color: bool,
    pub emoji: bool,
}

impl Style {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            color: false,
            emoji: false,
        }
    }

    /// Colour and symbols only on a terminal, and never under `NO_COLOR` or `CI`
    #[must_use]
    pub fn detect(tty: bool, env: &EnvSnapshot) -> Self {
        let rich = tty && env.var("NO_COLOR").is_none() && env.var("CI").is_none();
        Self {
            color: rich,
            emoji: rich,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextRenderer {
    style: Style,
    duplicates_max: usize,
}

impl TextRenderer {
    #[must_use]
    pub fn new(style: Style, duplicates_max: usize) -> Self {
        Self {
            style,
            duplicates_max,
        }
    }

    fn bold(&self, text: impl Display) -> String {
        if self.style.color { text.bold().to_string() } else { text.to_string() }
    }

    fn dim(&self, text: impl Display) -> String {
        if self.style.color { text.dimmed().to_string() } else { text.to_string() }
    }

    fn green(&self, text: impl Display) -> String {
        if self.style.color { text.green().to_string() } else { text.to_string() }
    }

    fn yellow(&self, text: impl Display) -> String {
        if self.style.color { text.yellow().to_string() } else { text.to_string() }
    }

    fn red(&self, text: impl Display) -> String {
        if self.style.color { text.red().to_string() } else { text.to_string() }
    }

    fn symbol(&self, rich: &'static str, plain: &'static str) -> &'static str {
        if self.style.emoji { rich } else { plain }
    }

    /// One progress event as zero or more lines
    #[must_use]
    pub fn event(&self, event: &ProgressEvent) -> Option<String> {
        let line = match event {
            ProgressEvent::RunStarted {
                managers, dry_run, ..
            } => {
                let suffix = if *dry_run { " (dry run)" } else { "" };
                self.bold(format!(
                    "Updating {} package manager(s){suffix}",
                    managers.len()
                ))
            }
            ProgressEvent::ManagerSkipped { manager, reason } => {
                self.dim(format!("- {manager}: skipped ({reason})"))
            }
            ProgressEvent::ResourceCheck { report } => self.resources(report),
            ProgressEvent::Duplicates { conflicts } => {
                if conflicts.is_empty() {
                    return None;
                }
                let mut out = self.yellow(format!(
                    "{} Binaries provided by more than one manager:",
                    self.symbol("⚠", "!")
                ));
                for line in duplicates::summarize(conflicts, self.duplicates_max) {
                    let _ = write!(out, "\n    {line}");
                }
                out
            }
            ProgressEvent::ManagerStarted {
                manager,
                index,
                total,
            } => format!("\n{}", self.bold(format!("[{index}/{total}] {manager}"))),
            ProgressEvent::StepStarted { step, .. } => {
                format!("  {} {step}", self.symbol("→", "->"))
            }
            ProgressEvent::StepCompleted {
                step, duration_ms, ..
            } => format!(
                "  {} {step} {}",
                self.green(self.symbol("✓", "ok")),
                self.dim(format!("({duration_ms} ms)"))
            ),
            ProgressEvent::StepFailed { step, error, .. } => {
                self.red(format!("  {} {step}: {error}", self.symbol("✗", "FAILED")))
            }
            ProgressEvent::Warning { message, .. } => self.yellow(format!(
                "  {} {message}",
                self.symbol("⚠", "warning:")
            )),
            ProgressEvent::DryRun { command, .. } => self.dim(format!("  would run: {command}")),
            ProgressEvent::PackageChanged { change } => format!("  {}", change_line(change)),
            ProgressEvent::ManagerCompleted {
                manager,
                duration_ms,
                packages,
                eta_secs,
            } => {
                #[allow(clippy::cast_precision_loss)]
                let secs = *duration_ms as f64 / 1000.0;
                let mut line = self.green(format!(
                    "  {manager} done in {secs:.1}s, {packages} package(s)"
                ));
                if let Some(eta) = eta_secs {
                    let _ = write!(line, "{}", self.dim(format!(" (about {eta}s remaining)")));
                }
                line
            }
            ProgressEvent::ManagerFailed { manager, error } => {
                self.red(format!("  {manager} failed: {error}"))
            }
            ProgressEvent::Notice { message } => self.dim(message),
        };
        Some(line)
    }

    fn resources(&self, report: &ResourceReport) -> String {
        let verdict = |ok: bool| {
            if ok {
                self.green("ok")
            } else {
                self.red("insufficient")
            }
        };

        let mut out = self.bold("Pre-flight check");
        let _ = write!(
            out,
            "\n  disk:    {:.1} GB free, {:.1} GB required (~{:.0} MB download) {}",
            report.available_gb,
            report.required_gb,
            report.estimated_download_mb,
            verdict(report.disk_space_ok)
        );
        let _ = write!(
            out,
            "\n  network: {}/{} repositories reachable {}",
            report.reachable_repos,
            report.total_repos,
            verdict(report.network_ok)
        );
        let _ = write!(
            out,
            "\n  memory:  {} MB available {}",
            report.available_memory_mb,
            verdict(report.memory_ok)
        );
        for error in &report.errors {
            let _ = write!(out, "\n  {}", self.red(error));
        }
        for recommendation in &report.recommendations {
            let _ = write!(out, "\n  {} {recommendation}", self.symbol("💡", "*"));
        }
        out
    }

    fn status(&self, status: ManagerStatus) -> String {
        let text = format!("{:<8}", status.to_string());
        match status {
            ManagerStatus::Success => self.green(text),
            ManagerStatus::Partial => self.yellow(text),
            ManagerStatus::Failed => self.red(text),
        }
    }

    /// Final summary table
    #[must_use]
    pub fn summary(&self, run: &RunResult) -> String {
        let mut out = format!("\n{}", self.bold(format!("Summary ({})", run.run_id)));

        if !run.managers.is_empty() {
            let _ = write!(
                out,
                "\n  {:<10} {:<8} {:>6} {:>8}  {}",
                "manager", "status", "units", "changes", "error"
            );
            for manager in &run.managers {
                let _ = write!(
                    out,
                    "\n  {:<10} {} {:>6} {:>8}  {}",
                    manager.name,
                    self.status(manager.status),
                    manager.plugins.len(),
                    manager.changes.len(),
                    manager.error.as_deref().unwrap_or_default()
                );
            }
        }

        if !run.skipped.is_empty() {
            let skipped: Vec<String> = run
                .skipped
                .iter()
                .map(|s| format!("{} ({})", s.name, s.reason))
                .collect();
            let _ = write!(out, "\n  skipped: {}", self.dim(skipped.join(", ")));
        }

        let totals = run.totals;
        let _ = write!(
            out,
            "\n  totals: install={} skip={} warnings={} conflicts={}",
            totals.install, totals.skip, totals.warnings, totals.conflicts
        );

        if let Some(error) = &run.error {
            let _ = write!(out, "\n  {}", self.red(format!("error: {error}")));
        }
        if run.cancelled {
            let _ = write!(out, "\n  {}", self.yellow("cancelled before completion"));
        }
        out
    }
}

/// `name old → new (x.y MB, minor)`
#[must_use]
pub fn change_line(change: &PackageChange) -> String {
    format!(
        "{} {} → {} ({:.1} MB, {})",
        change.name, change.old_version, change.new_version, change.download_mb, change.update_type
    )
}

/// The run result as pretty JSON
///
/// # Errors
/// Returns the serialization error
pub fn json(run: &RunResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(run)
}
