//! Trade reconciliation - main entry point
//!
//! This binary provides three subcommands:
//! - import: full rebuild of positions and equity curve from a trade CSV
//! - append: incremental import against already-persisted state
//! - show: print persisted positions, metrics, and the equity curve

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "trade-recon")]
#[command(about = "Reconcile broker trade logs into positions and an equity curve", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full rebuild from a complete trade history CSV
    Import {
        /// Path to the trade CSV (account,ticker,side,quantity,price,date,time)
        #[arg(short, long)]
        csv: String,

        /// Current total account value, anchor for the backward equity walk
        #[arg(short, long)]
        total_assets: String,

        /// Path to configuration file
        #[arg(long)]
        config: Option<String>,

        /// State database path (overrides config)
        #[arg(long)]
        db: Option<String>,
    },

    /// Incrementally integrate a new trade CSV against persisted state
    Append {
        /// Path to the new trade CSV
        #[arg(short, long)]
        csv: String,

        /// Path to configuration file
        #[arg(long)]
        config: Option<String>,

        /// State database path (overrides config)
        #[arg(long)]
        db: Option<String>,
    },

    /// Print persisted positions, metrics and equity curve
    Show {
        /// Total account value for percentage-based metrics
        #[arg(short, long)]
        total_assets: Option<String>,

        /// Path to configuration file
        #[arg(long)]
        config: Option<String>,

        /// State database path (overrides config)
        #[arg(long)]
        db: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Import { .. } => "import",
        Commands::Append { .. } => "append",
        Commands::Show { .. } => "show",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Import {
            csv,
            total_assets,
            config,
            db,
        } => commands::import::run(csv, total_assets, config, db),

        Commands::Append { csv, config, db } => commands::append::run(csv, config, db),

        Commands::Show {
            total_assets,
            config,
            db,
        } => commands::show::run(total_assets, config, db),
    }
}
