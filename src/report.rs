//! Analysis report assembly, rendering, and export
//!
//! The report is the engine's only output: a serializable aggregate of every
//! derived snapshot, a plain-text rendering for the terminal, and a CSV
//! export of the reconciled trades for downstream tooling.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use serde::Serialize;

use crate::analytics::{AnomalySummary, StrategyMetrics, SymbolPerformance, Totals};
use crate::reconcile::DecodeStats;
use crate::risk::RiskMetrics;
use crate::sessions::TimePerformance;
use crate::store::TradeStore;
use crate::types::TradeStatus;

/// Full output of one analysis run
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub totals: Totals,
    pub symbols: BTreeMap<String, SymbolPerformance>,
    pub strategy: StrategyMetrics,
    pub risk: RiskMetrics,
    pub time: TimePerformance,
    pub anomalies: AnomalySummary,
    pub decode_stats: DecodeStats,
}

impl AnalysisReport {
    /// Render the report as a sectioned text block
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);

        out.push_str(&format!("{}\n", rule));
        out.push_str("TRADE ANALYSIS REPORT\n");
        out.push_str(&format!("{}\n", rule));

        out.push_str(&format!(
            "Tickets:            {} ({} open / {} closed)\n",
            self.totals.total_tickets, self.totals.open_trades, self.totals.closed_trades
        ));
        out.push_str(&format!(
            "Analyzed Trades:    {}\n",
            self.totals.analyzed_trades
        ));
        out.push_str(&format!(
            "Net Profit:         ${:.2}\n",
            self.totals.net_profit
        ));
        out.push_str(&format!(
            "Win Rate:           {:.2}% ({}W / {}L / {}BE)\n",
            self.totals.win_rate, self.totals.wins, self.totals.losses, self.totals.breakevens
        ));

        out.push_str(&format!("{}\n", thin));
        out.push_str("SYMBOL PERFORMANCE\n");
        if self.symbols.is_empty() {
            out.push_str("  (no analyzable trades)\n");
        }
        for perf in self.symbols.values() {
            out.push_str(&format!(
                "  {:<10} {:>4} trades  win {:>6.2}%  net ${:>9.2}  pf {:>5.2}  SL {:>6.2}%\n",
                perf.symbol,
                perf.trade_count,
                perf.win_rate,
                perf.net_profit,
                perf.profit_factor,
                perf.sl_hit_rate
            ));
            out.push_str(&format!(
                "  {:<10} avg win ${:.2} / avg loss ${:.2}  best ${:.2} / worst ${:.2}\n",
                "", perf.avg_win, perf.avg_loss, perf.best_trade, perf.worst_trade
            ));
            if let Some(quality) = perf.avg_quality_score {
                out.push_str(&format!("  {:<10} avg quality {:.1}", "", quality));
                if let Some(spread) = perf.avg_spread_cost {
                    out.push_str(&format!("  avg spread ${:.2}", spread));
                }
                out.push('\n');
            }
        }

        out.push_str(&format!("{}\n", thin));
        out.push_str("STRATEGY BEHAVIOR\n");
        out.push_str(&format!(
            "  SL Hits:            {} ({:.2}%)\n",
            self.strategy.sl_hits, self.strategy.sl_hit_rate
        ));
        out.push_str(&format!(
            "  SL Effectiveness:   {:.1}%\n",
            self.strategy.sl_effectiveness * 100.0
        ));
        out.push_str(&format!(
            "  Profit-Lock Rate:   {:.1}%\n",
            self.strategy.profit_lock_rate * 100.0
        ));
        out.push_str(&format!(
            "  Micro Profits:      {} trades, ${:.2}\n",
            self.strategy.micro_profit_count, self.strategy.micro_profit_total
        ));
        out.push_str(&format!(
            "  Trailing-Stop Wins: {}\n",
            self.strategy.trailing_stop_wins
        ));
        if !self.strategy.filter_rejections.is_empty() {
            out.push_str("  Filter Rejections:\n");
            for (reason, count) in &self.strategy.filter_rejections {
                out.push_str(&format!("    {:<30} {}\n", reason, count));
            }
        }

        out.push_str(&format!("{}\n", thin));
        out.push_str("RISK & DRAWDOWN\n");
        out.push_str(&format!(
            "  Starting Balance:   ${:.2}\n",
            self.risk.starting_balance
        ));
        out.push_str(&format!(
            "  Final Equity:       ${:.2} (peak ${:.2})\n",
            self.risk.final_equity, self.risk.peak_equity
        ));
        out.push_str(&format!(
            "  Max Drawdown:       ${:.2} ({:.2}%)\n",
            self.risk.max_drawdown, self.risk.max_drawdown_pct
        ));
        if let (Some(start), Some(end)) = (self.risk.drawdown_start, self.risk.drawdown_end) {
            out.push_str(&format!(
                "  Worst Episode:      {} -> {} ({:.1}h)\n",
                start.format("%Y-%m-%d %H:%M:%S"),
                end.format("%Y-%m-%d %H:%M:%S"),
                self.risk.recovery_hours.unwrap_or(0.0)
            ));
        }
        out.push_str(&format!(
            "  Max Loss Streak:    {} (avg {:.2})\n",
            self.risk.max_loss_streak, self.risk.avg_loss_streak
        ));
        if self.risk.unsequenced_trades > 0 {
            out.push_str(&format!(
                "  Unsequenced:        {} trades without close time, excluded from replay\n",
                self.risk.unsequenced_trades
            ));
        }

        out.push_str(&format!("{}\n", thin));
        out.push_str("SESSION PERFORMANCE\n");
        for session in &self.time.sessions {
            out.push_str(&format!(
                "  {:<10} ({:02}:00-{:02}:00)  {:>4} trades  win {:>6.2}%  net ${:>9.2}\n",
                session.name,
                session.start_hour,
                session.end_hour,
                session.trade_count,
                session.win_rate,
                session.total_profit
            ));
        }
        let active_hours = self
            .time
            .hourly
            .iter()
            .filter(|(_, stats)| stats.trade_count > 0)
            .count();
        out.push_str(&format!("  Active Hours:       {}/24\n", active_hours));

        out.push_str(&format!("{}\n", thin));
        out.push_str("DATA QUALITY\n");
        out.push_str(&format!(
            "  Anomalous Trades:   {} (sum ${:.2}, excluded from all aggregates)\n",
            self.anomalies.anomalous_count, self.anomalies.anomalous_profit_sum
        ));
        out.push_str(&format!(
            "  Missing Profit:     {}\n",
            self.anomalies.closed_missing_profit
        ));
        out.push_str(&format!(
            "  Synthesized:        {} (close seen without open record)\n",
            self.anomalies.synthesized_count
        ));
        out.push_str(&format!(
            "  Negative Duration:  {}\n",
            self.anomalies.negative_duration_count
        ));
        out.push_str(&format!(
            "  Lines Skipped:      {} trade-log / {} execution-log\n",
            self.decode_stats.trade_logs.lines_skipped,
            self.decode_stats.execution_log.lines_skipped
        ));
        out.push_str(&format!("{}\n", rule));

        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    /// Write the JSON report under `results_dir`
    pub fn save_json(&self, results_dir: impl AsRef<Path>, filename: &str) -> Result<PathBuf> {
        let dir = results_dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create results directory")?;
        let path = dir.join(filename);
        fs::write(&path, self.to_json()?).context("Failed to write report JSON")?;
        Ok(path)
    }
}

/// Export every reconciled trade as CSV for downstream tooling
pub fn export_trades_csv(store: &TradeStore, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create export directory")?;
        }
    }

    let mut writer = csv::Writer::from_path(path).context("Failed to open CSV export")?;
    writer.write_record([
        "ticket",
        "symbol",
        "direction",
        "status",
        "entry_time",
        "close_time",
        "entry_price",
        "close_price",
        "lot_size",
        "profit_usd",
        "close_reason",
        "duration_seconds",
        "anomalous",
        "synthesized",
    ])?;

    for trade in store.trades() {
        writer.write_record([
            trade.ticket.to_string(),
            trade.symbol.clone(),
            format!("{:?}", trade.direction),
            match trade.status {
                TradeStatus::Open => "OPEN".to_string(),
                TradeStatus::Closed => "CLOSED".to_string(),
            },
            format_time(trade.entry_time),
            format_time(trade.close_time),
            format_opt(trade.entry_price),
            format_opt(trade.close_price),
            format!("{:.2}", trade.lot_size()),
            format_opt(trade.profit_usd),
            trade.close_reason.to_string(),
            trade.duration_seconds.to_string(),
            trade.anomalous.to_string(),
            trade.synthesized.to_string(),
        ])?;
    }

    writer.flush().context("Failed to flush CSV export")?;
    Ok(path.to_path_buf())
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn format_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.5}", v)).unwrap_or_default()
}
