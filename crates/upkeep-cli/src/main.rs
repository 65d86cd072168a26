//! upkeep CLI
//!
//! Updates every package manager on this machine in one sequential run

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::Result;
use eyre::eyre;
use kameo::actor::Spawn;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use upkeep_api::{CompatMode, ProgressEvent, Strategy};
use upkeep_core::{
    DuplicateConfig, EngineConfig, GetOverview, ManagerSelection, ResourceManager, RunUpdate,
    UpdateCoordinator, UpdateCoordinatorArgs, UpdateRequest,
};
use upkeep_exec::LocalExecutor;
use upkeep_pkg::EnvSnapshot;

mod render;

use render::{Style, TextRenderer};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Update package managers in one pass
#[derive(Parser, Debug)]
#[command(name = "upkeep", version, about)]
struct Args {
    /// Managers to update: one name, a comma separated list, or "all"
    #[arg(short, long, default_value = "all")]
    managers: String,

    /// Version strategy: latest, stable, minor or fixed
    #[arg(long, default_value = "stable")]
    strategy: Strategy,

    /// Compatibility handling: auto, strict or off
    #[arg(long, default_value = "auto")]
    compat: CompatMode,

    /// Show what would run without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Skip the duplicate binary scan
    #[arg(long)]
    no_check_duplicates: bool,

    /// Maximum number of duplicate binaries listed
    #[arg(long, default_value_t = 10)]
    duplicates_max: usize,

    /// Compatibility filter overlay (TOML)
    #[arg(long, value_name = "PATH")]
    compat_config: Option<PathBuf>,

    /// Run pip inside an active conda/mamba environment
    #[arg(long)]
    pip_allow_conda: bool,

    /// Remove orphaned pacman packages after upgrading
    #[arg(long)]
    pacman_clean_orphans: bool,

    /// Sample memory every SECONDS while the run is in flight
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    monitor: Option<u64>,

    /// List managers and whether they would run, then exit
    #[arg(long)]
    list: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace); overrides RUST_LOG
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print events until `done` fires, then flush what is buffered
async fn print_events(
    mut events: broadcast::Receiver<ProgressEvent>,
    renderer: TextRenderer,
    done: CancellationToken,
) {
    let print = |event: &ProgressEvent| {
        if let Some(text) = renderer.event(event) {
            println!("{text}");
        }
    };

    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => print(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress output lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = done.cancelled() => {
                while let Ok(event) = events.try_recv() {
                    print(&event);
                }
                break;
            }
        }
    }
}

fn request(args: &Args) -> Result<UpdateRequest> {
    Ok(UpdateRequest {
        managers: ManagerSelection::parse(&args.managers)?,
        strategy: args.strategy,
        compat: args.compat,
        dry_run: args.dry_run,
        pip_allow_conda: args.pip_allow_conda,
        pacman_clean_orphans: args.pacman_clean_orphans,
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = Args::parse();
    init_tracing(args.verbose);

    let env = EnvSnapshot::capture();
    let request = request(&args)?;

    let mut config = EngineConfig::load(args.compat_config.as_deref(), &env)?;
    config.duplicates = DuplicateConfig {
        enabled: !args.no_check_duplicates,
        max_shown: args.duplicates_max,
    };
    config.monitor_interval = args.monitor.map(Duration::from_secs);

    let cancel = CancellationToken::new();
    let resources = ResourceManager::system(config.thresholds, &env)?;
    let (event_tx, events) = broadcast::channel(EVENT_CAPACITY);
    let style = Style::detect(std::io::stdout().is_terminal(), &env);
    let renderer = TextRenderer::new(style, args.duplicates_max);

    let coordinator = UpdateCoordinator::spawn(UpdateCoordinatorArgs {
        config,
        executor: Arc::new(LocalExecutor::new().with_cancellation(cancel.clone())),
        env,
        resources,
        event_tx,
    });

    if args.list {
        let overview = coordinator
            .ask(GetOverview)
            .await
            .map_err(|e| eyre!("coordinator unavailable: {e}"))?;
        match args.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
            OutputFormat::Text => {
                for entry in &overview {
                    let status = entry.reason.as_deref().unwrap_or("available");
                    println!("{:<8} {status}", entry.manager.as_str());
                }
            }
        }
        let _ = coordinator.stop_gracefully().await;
        return Ok(ExitCode::SUCCESS);
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current command");
            interrupt.cancel();
        }
    });

    let printed = CancellationToken::new();
    let printer = match args.output {
        OutputFormat::Text => Some(tokio::spawn(print_events(
            events,
            renderer.clone(),
            printed.clone(),
        ))),
        OutputFormat::Json => {
            drop(events);
            None
        }
    };

    let result = coordinator
        .ask(RunUpdate { request, cancel })
        .await
        .map_err(|e| eyre!("update run failed: {e}"))?;

    printed.cancel();
    if let Some(printer) = printer {
        printer.await?;
    }
    let _ = coordinator.stop_gracefully().await;

    match args.output {
        OutputFormat::Json => println!("{}", render::json(&result)?),
        OutputFormat::Text => println!("{}", renderer.summary(&result)),
    }

    Ok(ExitCode::from(u8::try_from(result.exit_code()).unwrap_or(1)))
}
