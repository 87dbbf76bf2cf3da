//! Reconciliation engine
//!
//! Drives the event decoder over all log sources in a defined order
//! (per-symbol trade logs sorted by filename, then the execution log),
//! applies every event to the trade store, and finalizes it. File reads are
//! best-effort: lines are decoded lossily, unreadable files are skipped with
//! a warning, and per-source skip counts are kept for diagnostics. The only
//! fatal condition is the complete absence of both input sources.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::decoder::{self, Event};
use crate::store::TradeStore;

/// Filename suffix that marks a per-symbol trade log, e.g. `EURUSD_trades.log`
pub const TRADE_LOG_SUFFIX: &str = "_trades.log";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no input sources: neither trade logs nor an execution log could be read")]
    NoInputSources,
}

/// Per-source decode counters (skip-and-count diagnostics)
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub lines_read: usize,
    pub events_applied: usize,
    pub lines_skipped: usize,
}

impl SourceStats {
    fn record(&mut self, decoded: bool) {
        self.lines_read += 1;
        if decoded {
            self.events_applied += 1;
        } else {
            self.lines_skipped += 1;
        }
    }
}

/// Decode diagnostics for one reconciliation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeStats {
    pub trade_log_files: usize,
    pub trade_logs: SourceStats,
    pub execution_log: SourceStats,
    /// Signals declined by pre-trade filters, counted by reason
    pub filter_rejections: BTreeMap<String, usize>,
}

/// Result of a reconciliation run: the finalized store plus diagnostics
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub store: TradeStore,
    pub stats: DecodeStats,
}

/// Batch reconciliation driver
#[derive(Debug)]
pub struct Reconciler {
    trade_log_dir: PathBuf,
    execution_log: PathBuf,
    anomaly_threshold: f64,
}

impl Reconciler {
    pub fn new(
        trade_log_dir: impl Into<PathBuf>,
        execution_log: impl Into<PathBuf>,
        anomaly_threshold: f64,
    ) -> Self {
        Reconciler {
            trade_log_dir: trade_log_dir.into(),
            execution_log: execution_log.into(),
            anomaly_threshold,
        }
    }

    /// Read every source, apply all events, finalize the store.
    ///
    /// A partial run (one source missing) still reconciles what it has;
    /// only both sources missing is an error.
    pub fn run(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let mut store = TradeStore::new();
        let mut stats = DecodeStats::default();

        let trade_logs = discover_trade_logs(&self.trade_log_dir);
        let execution_lines = read_log_lines(&self.execution_log);

        if trade_logs.is_empty() && execution_lines.is_none() {
            return Err(ReconcileError::NoInputSources);
        }

        for (symbol, path) in &trade_logs {
            let Some(lines) = read_log_lines(path) else {
                warn!("Could not read trade log: {}", path.display());
                continue;
            };
            stats.trade_log_files += 1;

            let mut applied = 0usize;
            for line in &lines {
                match decoder::decode_trade_log_line(line, symbol) {
                    Some(event) => {
                        store.apply(&event);
                        applied += 1;
                        stats.trade_logs.record(true);
                    }
                    None => stats.trade_logs.record(false),
                }
            }
            info!(
                "Applied {} open records from {} ({} lines)",
                applied,
                path.display(),
                lines.len()
            );
        }

        if let Some(lines) = execution_lines {
            let mut applied = 0usize;
            for line in &lines {
                match decoder::decode_execution_line(line) {
                    Some(event) => {
                        if let Event::FilterRejected(rejection) = &event {
                            *stats
                                .filter_rejections
                                .entry(rejection.reason.clone())
                                .or_insert(0) += 1;
                        }
                        store.apply(&event);
                        applied += 1;
                        stats.execution_log.record(true);
                    }
                    None => stats.execution_log.record(false),
                }
            }
            info!(
                "Applied {} close/filter events from {} ({} lines)",
                applied,
                self.execution_log.display(),
                lines.len()
            );
        } else {
            warn!(
                "Execution log not readable, reconciling open records only: {}",
                self.execution_log.display()
            );
        }

        store.finalize(self.anomaly_threshold);
        info!("Reconciled {} trades", store.len());

        Ok(ReconcileOutcome { store, stats })
    }
}

/// Find `{SYMBOL}_trades.log` files in a directory, sorted by filename so
/// reconciliation order (and therefore tie-breaking) is deterministic
pub fn discover_trade_logs(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut logs: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let symbol = symbol_from_filename(name)?;
            Some((symbol, path))
        })
        .collect();

    logs.sort_by(|a, b| a.1.cmp(&b.1));
    logs
}

/// Extract the symbol tag from a trade-log filename
pub fn symbol_from_filename(name: &str) -> Option<String> {
    let symbol = name.strip_suffix(TRADE_LOG_SUFFIX)?;
    if symbol.is_empty() {
        return None;
    }
    Some(symbol.to_string())
}

/// Read a log file as lines, decoding lossily so encoding errors in one
/// line never abort the rest of the file. Returns `None` only when the file
/// itself cannot be read.
fn read_log_lines(path: &Path) -> Option<Vec<String>> {
    let bytes = fs::read(path).ok()?;
    let lines = bytes
        .split(|b| *b == b'\n')
        .map(|raw| {
            String::from_utf8_lossy(raw)
                .trim_end_matches('\r')
                .to_string()
        })
        .filter(|line| !line.trim().is_empty())
        .collect();
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_from_filename() {
        assert_eq!(
            symbol_from_filename("EURUSD_trades.log").as_deref(),
            Some("EURUSD")
        );
        assert_eq!(
            symbol_from_filename("BTC.USD_trades.log").as_deref(),
            Some("BTC.USD")
        );
        assert_eq!(symbol_from_filename("_trades.log"), None);
        assert_eq!(symbol_from_filename("execution.log"), None);
        assert_eq!(symbol_from_filename("EURUSD_trades.log.bak"), None);
    }

    #[test]
    fn test_missing_dir_discovers_nothing() {
        let logs = discover_trade_logs(Path::new("/nonexistent/path/for/test"));
        assert!(logs.is_empty());
    }

    #[test]
    fn test_both_sources_missing_is_fatal() {
        let reconciler = Reconciler::new(
            "/nonexistent/trade/logs",
            "/nonexistent/execution.log",
            crate::types::ANOMALY_THRESHOLD_USD,
        );
        assert!(matches!(
            reconciler.run(),
            Err(ReconcileError::NoInputSources)
        ));
    }
}
