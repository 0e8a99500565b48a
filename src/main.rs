//! Danmaku-Harvest main entry point
//!
//! This is the command-line interface for the Danmaku-Harvest archive builder.

use chrono::Utc;
use clap::Parser;
use danmaku_harvest::config::{load_config_with_hash, Config};
use danmaku_harvest::crawler::{run_harvest, HistoryMode, Termination};
use danmaku_harvest::output::{load_statistics, print_statistics, session_log_path};
use danmaku_harvest::storage::open_storage;
use danmaku_harvest::ContentId;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Danmaku-Harvest: an incremental danmaku archive builder
///
/// Danmaku-Harvest fetches the live comment document of every content id in
/// a range, backfills its history through the roll-date index, and stores
/// everything in SQLite without duplicates.
#[derive(Parser, Debug)]
#[command(name = "danmaku-harvest")]
#[command(version)]
#[command(about = "An incremental danmaku archive builder", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply without one)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// First content id to harvest
    #[arg(value_name = "START", required_unless_present = "stats")]
    start: Option<ContentId>,

    /// Last content id to harvest, inclusive (defaults to START)
    #[arg(value_name = "END")]
    end: Option<ContentId>,

    /// How much history to backfill, overriding the config file
    #[arg(long, value_enum)]
    history: Option<HistoryMode>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["start", "end", "history"])]
    stats: bool,
}

/// Exit code for a run stopped by a fatal storage condition
const EXIT_FATAL_STORAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut config, config_hash) = match load_config_with_hash(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            setup_logging(cli.verbose, cli.quiet, None);
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.stats {
        setup_logging(cli.verbose, cli.quiet, None);
        return handle_stats(&config);
    }

    let Some(start) = cli.start else {
        setup_logging(cli.verbose, cli.quiet, None);
        tracing::error!("A start content id is required");
        return ExitCode::FAILURE;
    };
    let end = cli.end.unwrap_or(start);
    if let Some(history) = cli.history {
        config.session.history = history;
    }

    let label = if cli.end.is_some() {
        format!("{}_{}", start, end)
    } else {
        start.to_string()
    };
    let log_file = open_session_log(Path::new(&config.output.log_dir), &label);
    setup_logging(cli.verbose, cli.quiet, log_file);

    if end < start {
        tracing::error!(
            "End content id {} is smaller than start content id {}",
            end,
            start
        );
        return ExitCode::FAILURE;
    }

    match &cli.config {
        Some(path) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            config_hash
        ),
        None => tracing::info!("No configuration file given, using defaults"),
    }

    handle_harvest(&config, &config_hash, start, end).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs always go to stdout; with a session log file they are mirrored
/// there without ANSI colors.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<File>) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("danmaku_harvest=info,warn"),
            1 => EnvFilter::new("danmaku_harvest=debug,info"),
            2 => EnvFilter::new("danmaku_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Creates the append-only log file for this session
///
/// Runs before logging is set up, so problems go to stderr.
fn open_session_log(log_dir: &Path, label: &str) -> Option<File> {
    let path = session_log_path(log_dir, label, Utc::now());
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Cannot create log directory {}: {}", parent.display(), e);
            return None;
        }
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Cannot open session log {}: {}", path.display(), e);
            None
        }
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> ExitCode {
    println!("Database: {}\n", config.output.database_path);

    let store = match open_storage(Path::new(&config.output.database_path)) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            return ExitCode::from(EXIT_FATAL_STORAGE);
        }
    };

    match load_statistics(&store) {
        Ok(stats) => {
            print_statistics(&stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to load statistics: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    config_hash: &str,
    start: ContentId,
    end: ContentId,
) -> ExitCode {
    match run_harvest(config, config_hash, start, end).await {
        Ok(report) => match report.termination {
            Termination::Completed => ExitCode::SUCCESS,
            Termination::Fatal(_) => ExitCode::from(EXIT_FATAL_STORAGE),
            Termination::BudgetExhausted | Termination::Interrupted => ExitCode::FAILURE,
        },
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            if e.is_session_fatal() {
                ExitCode::from(EXIT_FATAL_STORAGE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
