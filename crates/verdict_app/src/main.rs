//! verdict - resumable batch classification of screenshot URLs

mod config;
mod output;

use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use verdict_core::{extract_items, ItemFilter, RunReport, RunState, WorkItemStore};
use verdict_engine::{
    export_report, read_table, Delimiter, ExportOptions, FileStorage, HttpClassifier,
    RunController, RunHandle, RunnerOptions, StopReason,
};
use verdict_logging::{verdict_info, verdict_warn, LogDestination, DEFAULT_LOG_FILE};

use crate::config::AppConfig;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "verdict",
    version,
    about = "Resumable batch classification of screenshot URLs"
)]
struct Cli {
    /// RON configuration file
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log debug output to the terminal as well as the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a new run from a sheet export and process it
    Start(StartArgs),
    /// Continue the persisted run from its first pending item
    Resume,
    /// Show counts, accuracy and timing of the persisted run
    Status(StatusArgs),
    /// Write the detail table and summary to the export directory
    Export,
    /// Discard the persisted run
    Reset,
}

#[derive(Args)]
struct StartArgs {
    /// Sheet to read: .xlsx/.xls/.ods (first sheet) or a tab or comma separated export
    table: PathBuf,

    /// Field delimiter of a text export; defaults to comma for .csv files and tab otherwise
    #[arg(long, value_enum)]
    delimiter: Option<DelimiterArg>,
}

#[derive(Args)]
struct StatusArgs {
    /// List items: all, pending, in-flight, succeeded, failed, correct, incorrect
    #[arg(short, long)]
    filter: Option<ItemFilter>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DelimiterArg {
    Tab,
    Comma,
}

impl From<DelimiterArg> for Delimiter {
    fn from(arg: DelimiterArg) -> Self {
        match arg {
            DelimiterArg::Tab => Delimiter::Tab,
            DelimiterArg::Comma => Delimiter::Comma,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_file = PathBuf::from(DEFAULT_LOG_FILE);
    if cli.verbose {
        verdict_logging::initialize(LogDestination::Both(log_file), LevelFilter::Debug);
    } else {
        verdict_logging::initialize(LogDestination::File(log_file), LevelFilter::Info);
    }

    let config = config::load(&cli.config)?;
    let config = config::apply_env(config, |key| std::env::var(key).ok());

    let storage = FileStorage::new(config.state_dir.clone());

    match cli.command {
        Commands::Start(args) => {
            let table = read_table(&args.table, args.delimiter.map(Delimiter::from))?;
            let items = extract_items(&table, &config.ingest);
            if items.is_empty() {
                bail!("no URLs found in {}", args.table.display());
            }
            println!("Seeded {} items from {}", items.len(), args.table.display());

            let store = open_store(storage)?;
            let controller = build_controller(store, &config)?;
            let handle = controller.start(items)?;
            run_in_foreground(&controller, handle).await
        }
        Commands::Resume => {
            let controller = build_controller(open_store(storage)?, &config)?;
            let handle = controller.resume()?;
            run_in_foreground(&controller, handle).await
        }
        Commands::Status(args) => {
            let state = load_snapshot(&storage)?;
            output::print_summary(&state);
            if let Some(filter) = args.filter {
                println!();
                output::print_items(&state, filter);
            }
            Ok(())
        }
        Commands::Export => {
            let state = load_snapshot(&storage)?;
            let summary = export_report(
                &state,
                &config.export_dir,
                &ExportOptions::default(),
                Utc::now(),
            )?;
            println!("Detail:  {}", summary.detail_path.display());
            if let Some(path) = summary.summary_path {
                println!("Summary: {}", path.display());
            }
            Ok(())
        }
        Commands::Reset => {
            let mut store = open_store(storage)?;
            store.reset()?;
            println!("Run state cleared");
            Ok(())
        }
    }
}

/// Opens the store for a command that mutates the run; this is where an
/// interrupted run is recovered.
fn open_store(storage: FileStorage) -> Result<WorkItemStore> {
    let (store, recovery) =
        WorkItemStore::open(Box::new(storage)).context("failed to open run state")?;
    if !recovery.reverted.is_empty() {
        println!(
            "Recovered an interrupted run: {} item(s) returned to pending",
            recovery.reverted.len()
        );
    }
    Ok(store)
}

/// Reporting commands read the state as persisted and never write it.
fn load_snapshot(storage: &FileStorage) -> Result<RunState> {
    WorkItemStore::load_snapshot(storage).context("failed to load run state")
}

fn build_controller(store: WorkItemStore, config: &AppConfig) -> Result<RunController> {
    if config.classifier.workflow_id.trim().is_empty() {
        bail!("classifier.workflow_id is not set in the config file");
    }
    let classifier =
        HttpClassifier::new(config.classifier.clone()).context("failed to build HTTP client")?;
    let options = RunnerOptions {
        markers: config.markers.clone(),
        ..RunnerOptions::default()
    };
    Ok(RunController::new(store, Arc::new(classifier), options))
}

/// Waits for the run, printing progress. The first Ctrl-C requests
/// cancellation; the run then settles on its own.
async fn run_in_foreground(controller: &RunController, handle: RunHandle) -> Result<()> {
    let mut wait = pin!(handle.wait());
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    let mut cancel_requested = false;

    let reason = loop {
        tokio::select! {
            result = &mut wait => break result?,
            signal = tokio::signal::ctrl_c(), if !cancel_requested => {
                signal.context("failed to listen for Ctrl-C")?;
                cancel_requested = true;
                println!("Cancelling; waiting for the current item to settle...");
                if let Err(err) = controller.cancel() {
                    verdict_warn!("Cancel not applied: {}", err);
                }
            }
            _ = ticker.tick() => {
                let report = RunReport::from_state(&controller.snapshot()?);
                println!("Progress: {}", output::progress_line(&report.counts));
            }
        }
    };

    verdict_info!("Run ended: {:?}", reason);
    println!();
    match reason {
        StopReason::Exhausted => println!("Run complete."),
        StopReason::Cancelled => println!("Run paused. Use `verdict resume` to continue."),
    }
    output::print_summary(&controller.snapshot()?);
    Ok(())
}
