//! Export command implementation

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use trade_forensics::report::export_trades_csv;
use trade_forensics::{Config, ReconcileError, Reconciler};

pub fn run(config_path: Option<String>, output: Option<String>) -> Result<()> {
    info!("Starting trade export");

    let config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let reconciler = Reconciler::new(
        &config.inputs.trade_log_dir,
        &config.inputs.execution_log,
        config.analysis.anomaly_threshold,
    );

    let outcome = match reconciler.run() {
        Ok(outcome) => outcome,
        Err(ReconcileError::NoInputSources) => {
            println!(
                "No data: neither {} nor {} could be read.",
                config.inputs.trade_log_dir, config.inputs.execution_log
            );
            return Ok(());
        }
    };

    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.report.results_dir).join("trades.csv"));

    let written = export_trades_csv(&outcome.store, &path)?;
    println!(
        "Exported {} trades to {}",
        outcome.store.len(),
        written.display()
    );

    info!("Export completed successfully");
    Ok(())
}
