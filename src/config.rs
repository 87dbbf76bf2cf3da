//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every field has
//! a default so a partial config (or none at all) still produces a working
//! setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{ANOMALY_THRESHOLD_USD, DEFAULT_RISK_USD, STARTING_BALANCE_USD};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inputs: InputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

/// Input log locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory holding the per-symbol `{SYMBOL}_trades.log` files
    pub trade_log_dir: String,
    /// Path of the free-text execution log
    pub execution_log: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            trade_log_dir: "logs/trades".to_string(),
            execution_log: "logs/execution.log".to_string(),
        }
    }
}

/// Analysis knobs. The defaults match the bot's configured behavior and are
/// what the derived metrics assume when nothing is overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Nominal balance the equity replay starts from
    pub starting_balance: f64,
    /// Profit magnitude above which a trade is a data-capture error
    pub anomaly_threshold: f64,
    /// Intended risk per trade; SL effectiveness measures losses against it
    pub risk_per_trade_usd: f64,
    /// Absolute tolerance around the risk amount for SL effectiveness
    pub sl_tolerance_usd: f64,
    /// Micro-profit bucket bounds, inclusive
    pub micro_profit_min: f64,
    pub micro_profit_max: f64,
    /// Generic closure method counted as a trailing-stop exit
    pub trailing_method: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            starting_balance: STARTING_BALANCE_USD,
            anomaly_threshold: ANOMALY_THRESHOLD_USD,
            risk_per_trade_usd: DEFAULT_RISK_USD,
            sl_tolerance_usd: 0.15,
            micro_profit_min: 0.01,
            micro_profit_max: 0.50,
            trailing_method: "TrailingStop".to_string(),
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub results_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            results_dir: "results".to_string(),
        }
    }
}
