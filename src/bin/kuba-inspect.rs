//! Kuba Inspect CLI
//!
//! Offline tools for TSM data directories.
//!
//! # CLI Commands
//!
//! - `cardinality` - Report series and field cardinality per measurement
//!
//! # Configuration
//!
//! Settings are read from, in increasing precedence:
//! 1. Built-in defaults
//! 2. `--config <file>` or the `TSDB_INSPECT_CONFIG` environment variable
//! 3. `TSDB_DB_PATH`, `TSDB_CONCURRENCY`, `TSDB_EXACT`, `TSDB_HLL_PRECISION`, `RUST_LOG`
//! 4. Command-line flags

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kuba_inspect::{CardinalityCommand, InspectConfig};
use tracing::debug;

/// Command-line interface
#[derive(Parser, Debug)]
#[command(name = "kuba-inspect")]
#[command(version)]
#[command(about = "Offline inspection tools for TSM shard directories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Report series and field cardinality for every measurement
    Cardinality {
        /// Path to the data directory holding database directories. Required.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Worker concurrency. Defaults to available parallelism.
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,

        /// Report exact counts
        #[arg(long)]
        exact: bool,

        /// HyperLogLog precision (4-18) for estimated counts
        #[arg(long)]
        precision: Option<u8>,
    },
}

/// Build the run configuration: file and environment, then flags
fn resolve_config(cli: &Cli) -> kuba_inspect::Result<InspectConfig> {
    let mut config = InspectConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Cardinality {
            db_path,
            concurrency,
            exact,
            precision,
        } => {
            if let Some(db_path) = db_path {
                config.db_path = Some(db_path.clone());
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = *concurrency;
            }
            if *exact {
                config.exact = true;
            }
            if let Some(precision) = precision {
                config.precision = *precision;
            }
        },
    }
    Ok(config)
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn cmd_cardinality(config: InspectConfig) -> kuba_inspect::Result<()> {
    let stdout = io::stdout();
    let run = CardinalityCommand::new(config, stdout.lock(), io::stderr()).run()?;
    debug!(
        rows = run.report.rows().len(),
        diagnostics = run.diagnostics.len(),
        "cardinality report written"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        },
    };
    init_tracing(&config.log_level);

    let result = match cli.command {
        Commands::Cardinality { .. } => cmd_cardinality(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
