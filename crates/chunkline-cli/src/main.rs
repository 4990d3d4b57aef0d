//! chunkline - day-partitioned ingestion of contract event logs
//!
//! Reads JSON-lines record streams, cuts them into UTC calendar days, and
//! persists each completed day as CSV + Parquet objects, an optional DuckDB
//! warehouse append, and a resumable position marker.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "chunkline")]
#[command(about = "Day-partitioned ingestion of contract event logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./chunkline.toml or ~/.config/chunkline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Object store: local directory or s3://bucket/prefix
    #[arg(long, global = true)]
    store: Option<String>,

    /// DuckDB warehouse file (enables the warehouse)
    #[arg(long, global = true)]
    warehouse: Option<std::path::PathBuf>,

    /// Records per submitted batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Maximum retry attempts for transient store failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Streams ingested in parallel
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest configured streams into day files
    Ingest(cmd::ingest::IngestArgs),
    /// Show stored position markers per stream
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let progress = Arc::new(chunkline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, status lines show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    chunkline_core::init_logging(
        chunkline_core::Verbosity::from_flags(quiet, cli.debug),
        multi,
    );

    chunkline_core::install_signal_handlers().context("Failed to install signal handlers")?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.apply(Overrides {
        store: cli.store,
        warehouse: cli.warehouse,
        batch_size: cli.batch_size,
        max_retries: cli.max_retries,
        workers: cli.workers,
    });
    config.validate()?;

    match cli.command {
        Command::Ingest(args) => cmd::ingest::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            let mut rows = vec![
                ("Store", config.storage.url.clone()),
                (
                    "Warehouse",
                    if config.warehouse.enabled {
                        config.warehouse.path.display().to_string()
                    } else {
                        "disabled".to_string()
                    },
                ),
                (
                    "Warehouse policy",
                    if config.warehouse.required {
                        "required".to_string()
                    } else {
                        "best effort".to_string()
                    },
                ),
                ("Compression level", config.output.zstd_level.to_string()),
                ("Batch size", config.ingest.batch_size.to_string()),
                ("Max retries", config.ingest.max_retries.to_string()),
                ("Workers", config.ingest.workers.to_string()),
            ];
            for stream in &config.streams {
                rows.push((
                    "Stream",
                    format!("{} <- {}", stream.id().slug(), stream.input.display()),
                ));
            }
            cmd::print_table(
                &["Setting", "Value"],
                rows.into_iter().map(|(k, v)| vec![k.to_string(), v]),
            );
            Ok(())
        }
    }
}
