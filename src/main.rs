//! Trade forensics - main entry point
//!
//! This binary provides two subcommands:
//! - analyze: Reconcile the bot's logs and print the full analysis report
//! - export: Reconcile and dump the trade records as CSV

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "trade-forensics")]
#[command(about = "Trade lifecycle reconstruction and performance analytics for trading-bot logs", long_about = None)]
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
    /// Reconcile logs and print the analysis report
    Analyze {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Directory of per-symbol trade logs (overrides config)
        #[arg(short, long)]
        trade_logs: Option<String>,

        /// Path of the execution log (overrides config)
        #[arg(short, long)]
        execution_log: Option<String>,

        /// Also save the report as JSON under the results directory
        #[arg(long)]
        json: bool,
    },

    /// Reconcile logs and export the trade records as CSV
    Export {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Output CSV path (defaults to <results_dir>/trades.csv)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
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
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
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

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Analyze { .. } => "analyze",
        Commands::Export { .. } => "export",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Analyze {
            config,
            trade_logs,
            execution_log,
            json,
        } => commands::analyze::run(config, trade_logs, execution_log, json),

        Commands::Export { config, output } => commands::export::run(config, output),
    }
}
