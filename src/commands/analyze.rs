//! Analyze command implementation

use anyhow::Result;
use tracing::info;

use trade_forensics::{AnalyticsEngine, Config, ReconcileError, Reconciler};

pub fn run(
    config_path: Option<String>,
    trade_logs_override: Option<String>,
    execution_log_override: Option<String>,
    json: bool,
) -> Result<()> {
    info!("Starting analysis");

    let mut config = match &config_path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(dir) = trade_logs_override {
        info!("Overriding trade-log directory to: {}", dir);
        config.inputs.trade_log_dir = dir;
    }
    if let Some(path) = execution_log_override {
        info!("Overriding execution log to: {}", path);
        config.inputs.execution_log = path;
    }

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

    let engine = AnalyticsEngine::new(config.analysis.clone());
    let report = engine.analyze(&outcome.store, outcome.stats);

    println!("{}", report.render());

    if json {
        let filename = format!(
            "analysis_{}.json",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let path = report.save_json(&config.report.results_dir, &filename)?;
        println!("Report saved: {}", path.display());
    }

    info!("Analysis completed successfully");
    Ok(())
}
