//! Analytics over the finalized trade store
//!
//! Partitions the reconciled trades once (closed non-anomalous trades with
//! a reported profit form the analysis set; anomalous trades are tracked
//! separately and excluded from every aggregate), then derives per-symbol
//! performance, strategy-behavior metrics, the equity/drawdown replay, and
//! the time-of-day breakdown. Every ratio returns a neutral 0 when its
//! denominator would be zero.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::AnalysisConfig;
use crate::reconcile::DecodeStats;
use crate::report::AnalysisReport;
use crate::risk::compute_risk_metrics;
use crate::sessions::compute_time_performance;
use crate::store::TradeStore;
use crate::types::{CloseReason, Trade, TradeStatus};

// =============================================================================
// Snapshot types
// =============================================================================

/// Per-symbol performance snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolPerformance {
    pub symbol: String,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    /// Percent of trades with positive profit
    pub win_rate: f64,
    pub net_profit: f64,
    /// Mean of the positive profits; 0 when there are no winners
    pub avg_win: f64,
    /// Mean of the negative profits (a negative number); 0 when no losers
    pub avg_loss: f64,
    /// |avg_win / avg_loss|; 0 when there are no losses
    pub profit_factor: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    /// Percent of trades closed by stop-loss
    pub sl_hit_rate: f64,
    /// Mean quality score over the trades that reported one
    pub avg_quality_score: Option<f64>,
    /// Mean spread cost over the trades that reported one
    pub avg_spread_cost: Option<f64>,
}

/// Strategy-behavior snapshot over the whole analysis set
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyMetrics {
    pub sl_hits: usize,
    /// Percent of analyzed trades closed by stop-loss
    pub sl_hit_rate: f64,
    /// Fraction of losing trades whose magnitude lies within the configured
    /// tolerance of the intended per-trade risk: how often a loss is the
    /// stop doing its job rather than an uncontrolled exit
    pub sl_effectiveness: f64,
    /// Fraction of winning trades closed by neither SL nor TP
    pub profit_lock_rate: f64,
    /// Trades with profit inside the micro bucket, and their summed P&L
    pub micro_profit_count: usize,
    pub micro_profit_total: f64,
    /// Winning trades closed by the configured trailing method
    pub trailing_stop_wins: usize,
    /// Signals declined by pre-trade filters, by reason
    pub filter_rejections: BTreeMap<String, usize>,
}

/// Headline totals over the whole store
#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub total_tickets: usize,
    pub open_trades: usize,
    pub closed_trades: usize,
    /// Closed, non-anomalous, with reported profit
    pub analyzed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    pub win_rate: f64,
    pub net_profit: f64,
}

/// Audit counts for retained-but-excluded records
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalySummary {
    pub anomalous_count: usize,
    /// Summed P&L of the anomalous trades; excluded from every aggregate
    /// but still reportable
    pub anomalous_profit_sum: f64,
    /// Closed trades that never reported a profit (distinct from anomalous)
    pub closed_missing_profit: usize,
    /// Trades synthesized from orphaned close events
    pub synthesized_count: usize,
    /// Trades whose computed duration was negative
    pub negative_duration_count: usize,
}

// =============================================================================
// Engine
// =============================================================================

/// Stateless calculator deriving the full analysis report from a finalized
/// trade store
#[derive(Debug)]
pub struct AnalyticsEngine {
    config: AnalysisConfig,
}

impl AnalyticsEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        AnalyticsEngine { config }
    }

    /// Compute every derived snapshot in one pass over the store
    pub fn analyze(&self, store: &TradeStore, decode_stats: DecodeStats) -> AnalysisReport {
        let mut analysis: Vec<&Trade> = Vec::new();
        let mut anomalous: Vec<&Trade> = Vec::new();
        let mut totals = Totals {
            total_tickets: store.len(),
            ..Totals::default()
        };
        let mut anomaly = AnomalySummary::default();

        for trade in store.trades() {
            match trade.status {
                TradeStatus::Open => totals.open_trades += 1,
                TradeStatus::Closed => totals.closed_trades += 1,
            }
            if trade.synthesized {
                anomaly.synthesized_count += 1;
            }
            if trade.negative_duration {
                anomaly.negative_duration_count += 1;
            }

            if trade.anomalous {
                anomalous.push(trade);
            } else if trade.in_analysis_set() {
                analysis.push(trade);
            } else if trade.status == TradeStatus::Closed && trade.profit_usd.is_none() {
                anomaly.closed_missing_profit += 1;
            }
        }

        anomaly.anomalous_count = anomalous.len();
        anomaly.anomalous_profit_sum = anomalous.iter().filter_map(|t| t.profit_usd).sum();

        totals.analyzed_trades = analysis.len();
        totals.wins = analysis.iter().filter(|t| t.is_win()).count();
        totals.losses = analysis.iter().filter(|t| t.is_loss()).count();
        totals.breakevens = analysis.iter().filter(|t| t.is_breakeven()).count();
        totals.net_profit = analysis.iter().filter_map(|t| t.profit_usd).sum();
        totals.win_rate = percent(totals.wins, totals.analyzed_trades);

        AnalysisReport {
            totals,
            symbols: self.symbol_performance(&analysis),
            strategy: self.strategy_metrics(&analysis, &decode_stats),
            risk: compute_risk_metrics(&analysis, self.config.starting_balance),
            time: compute_time_performance(&analysis),
            anomalies: anomaly,
            decode_stats,
        }
    }

    fn symbol_performance(&self, analysis: &[&Trade]) -> BTreeMap<String, SymbolPerformance> {
        let grouped = analysis
            .iter()
            .copied()
            .into_group_map_by(|trade| trade.symbol.clone());

        grouped
            .into_iter()
            .map(|(symbol, trades)| {
                let perf = Self::performance_for(&symbol, &trades);
                (symbol, perf)
            })
            .collect()
    }

    fn performance_for(symbol: &str, trades: &[&Trade]) -> SymbolPerformance {
        let profits: Vec<f64> = trades.iter().filter_map(|t| t.profit_usd).collect();
        let win_profits: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
        let loss_profits: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).collect();

        let avg_win = mean_or_zero(&win_profits);
        let avg_loss = mean_or_zero(&loss_profits);
        let profit_factor = if loss_profits.is_empty() {
            0.0
        } else {
            (avg_win / avg_loss).abs()
        };

        let sl_hits = trades
            .iter()
            .filter(|t| t.close_reason == CloseReason::StopLoss)
            .count();

        let quality: Vec<f64> = trades.iter().filter_map(|t| t.quality_score).collect();
        let spread: Vec<f64> = trades.iter().filter_map(|t| t.spread_cost).collect();

        SymbolPerformance {
            symbol: symbol.to_string(),
            trade_count: trades.len(),
            wins: win_profits.len(),
            losses: loss_profits.len(),
            breakevens: profits.iter().filter(|p| **p == 0.0).count(),
            win_rate: percent(win_profits.len(), trades.len()),
            net_profit: profits.iter().sum(),
            avg_win,
            avg_loss,
            profit_factor,
            best_trade: profits.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_trade: profits.iter().copied().fold(f64::INFINITY, f64::min),
            sl_hit_rate: percent(sl_hits, trades.len()),
            avg_quality_score: mean_if_any(&quality),
            avg_spread_cost: mean_if_any(&spread),
        }
    }

    fn strategy_metrics(&self, analysis: &[&Trade], decode_stats: &DecodeStats) -> StrategyMetrics {
        let sl_hits = analysis
            .iter()
            .filter(|t| t.close_reason == CloseReason::StopLoss)
            .count();

        let losers: Vec<&&Trade> = analysis.iter().filter(|t| t.is_loss()).collect();
        let winners: Vec<&&Trade> = analysis.iter().filter(|t| t.is_win()).collect();

        // Losses within tolerance of the intended risk amount are attributed
        // to the stop working as configured
        let stopped_as_intended = losers
            .iter()
            .filter(|t| {
                let magnitude = t.profit_usd.unwrap_or(0.0).abs();
                (magnitude - self.config.risk_per_trade_usd).abs() <= self.config.sl_tolerance_usd
            })
            .count();

        let locked = winners
            .iter()
            .filter(|t| !t.close_reason.is_authoritative())
            .count();

        let micro: Vec<f64> = analysis
            .iter()
            .filter_map(|t| t.profit_usd)
            .filter(|p| *p >= self.config.micro_profit_min && *p <= self.config.micro_profit_max)
            .collect();

        let trailing_stop_wins = winners
            .iter()
            .filter(|t| t.close_reason == CloseReason::Other(self.config.trailing_method.clone()))
            .count();

        StrategyMetrics {
            sl_hits,
            sl_hit_rate: percent(sl_hits, analysis.len()),
            sl_effectiveness: fraction(stopped_as_intended, losers.len()),
            profit_lock_rate: fraction(locked, winners.len()),
            micro_profit_count: micro.len(),
            micro_profit_total: micro.iter().sum(),
            trailing_stop_wins,
            filter_rejections: decode_stats.filter_rejections.clone(),
        }
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64) * 100.0
    }
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().mean()
    }
}

fn mean_if_any(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().copied().mean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::parse_timestamp;
    use approx::assert_relative_eq;

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(AnalysisConfig::default())
    }

    fn closed_trade(ticket: u64, symbol: &str, profit: f64, reason: CloseReason) -> Trade {
        let mut trade = Trade::new(ticket, symbol);
        trade.status = TradeStatus::Closed;
        trade.profit_usd = Some(profit);
        trade.close_reason = reason;
        trade.close_time = parse_timestamp("2024-01-01 10:00:00");
        trade
    }

    fn analyze(trades: Vec<Trade>) -> AnalysisReport {
        let mut store = TradeStore::new();
        for trade in trades {
            store.insert_for_test(trade);
        }
        store.finalize(crate::types::ANOMALY_THRESHOLD_USD);
        engine().analyze(&store, DecodeStats::default())
    }

    #[test]
    fn test_symbol_performance_counts_and_rates() {
        let report = analyze(vec![
            closed_trade(1, "EURUSD", 4.0, CloseReason::TakeProfit),
            closed_trade(2, "EURUSD", -2.0, CloseReason::StopLoss),
            closed_trade(3, "EURUSD", 0.0, CloseReason::Other("Manual".into())),
            closed_trade(4, "GBPUSD", 1.0, CloseReason::Other("Manual".into())),
        ]);

        let eur = &report.symbols["EURUSD"];
        assert_eq!(eur.trade_count, 3);
        assert_eq!(eur.wins, 1);
        assert_eq!(eur.losses, 1);
        assert_eq!(eur.breakevens, 1);
        assert_relative_eq!(eur.win_rate, 100.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(eur.net_profit, 2.0);
        assert_relative_eq!(eur.avg_win, 4.0);
        assert_relative_eq!(eur.avg_loss, -2.0);
        assert_relative_eq!(eur.profit_factor, 2.0);
        assert_relative_eq!(eur.best_trade, 4.0);
        assert_relative_eq!(eur.worst_trade, -2.0);
        assert_relative_eq!(eur.sl_hit_rate, 100.0 / 3.0, epsilon = 1e-9);

        assert_eq!(report.symbols["GBPUSD"].trade_count, 1);
    }

    #[test]
    fn test_profit_factor_zero_when_no_losses() {
        let report = analyze(vec![
            closed_trade(1, "EURUSD", 4.0, CloseReason::TakeProfit),
            closed_trade(2, "EURUSD", 2.0, CloseReason::TakeProfit),
        ]);
        assert_eq!(report.symbols["EURUSD"].profit_factor, 0.0);
    }

    #[test]
    fn test_quality_mean_covers_only_reporting_trades() {
        let mut with_score = closed_trade(1, "EURUSD", 1.0, CloseReason::TakeProfit);
        with_score.quality_score = Some(80.0);
        let mut with_score2 = closed_trade(2, "EURUSD", 1.0, CloseReason::TakeProfit);
        with_score2.quality_score = Some(60.0);
        let without = closed_trade(3, "EURUSD", 1.0, CloseReason::TakeProfit);

        let report = analyze(vec![with_score, with_score2, without]);
        let eur = &report.symbols["EURUSD"];
        assert_relative_eq!(eur.avg_quality_score.unwrap(), 70.0);
        assert_eq!(eur.avg_spread_cost, None);
    }

    #[test]
    fn test_sl_effectiveness_tolerance() {
        // -2.10 and -1.90 are within +/-0.15 of the 2.00 risk; -3.00 is not
        let report = analyze(vec![
            closed_trade(1, "EURUSD", -2.10, CloseReason::StopLoss),
            closed_trade(2, "EURUSD", -1.90, CloseReason::StopLoss),
            closed_trade(3, "EURUSD", -3.00, CloseReason::Other("Manual".into())),
            closed_trade(4, "EURUSD", 5.00, CloseReason::TakeProfit),
        ]);
        assert_relative_eq!(report.strategy.sl_effectiveness, 2.0 / 3.0);
        assert_eq!(report.strategy.sl_hits, 2);
        assert_relative_eq!(report.strategy.sl_hit_rate, 50.0);
    }

    #[test]
    fn test_profit_lock_and_trailing_counts() {
        let report = analyze(vec![
            closed_trade(1, "EURUSD", 0.30, CloseReason::Other("TrailingStop".into())),
            closed_trade(2, "EURUSD", 1.50, CloseReason::Other("Manual".into())),
            closed_trade(3, "EURUSD", 4.00, CloseReason::TakeProfit),
            closed_trade(4, "EURUSD", -2.00, CloseReason::StopLoss),
        ]);
        // 2 of 3 winners closed by neither SL nor TP
        assert_relative_eq!(report.strategy.profit_lock_rate, 2.0 / 3.0);
        assert_eq!(report.strategy.trailing_stop_wins, 1);
        // 0.30 falls in the [0.01, 0.50] micro bucket
        assert_eq!(report.strategy.micro_profit_count, 1);
        assert_relative_eq!(report.strategy.micro_profit_total, 0.30);
    }

    #[test]
    fn test_anomalous_trades_excluded_everywhere_but_reported() {
        let report = analyze(vec![
            closed_trade(1, "EURUSD", 2.0, CloseReason::TakeProfit),
            closed_trade(2, "EURUSD", 50_000.0, CloseReason::TakeProfit),
            closed_trade(3, "EURUSD", -20_000.0, CloseReason::StopLoss),
        ]);

        assert_eq!(report.totals.analyzed_trades, 1);
        assert_relative_eq!(report.totals.net_profit, 2.0);
        assert_eq!(report.symbols["EURUSD"].trade_count, 1);
        assert_relative_eq!(report.totals.win_rate, 100.0);

        assert_eq!(report.anomalies.anomalous_count, 2);
        assert_relative_eq!(report.anomalies.anomalous_profit_sum, 30_000.0);
        // The replay never sees them either
        assert_eq!(report.risk.replayed_trades, 1);
    }

    #[test]
    fn test_closed_without_profit_is_counted_not_analyzed() {
        let mut no_profit = closed_trade(1, "EURUSD", 0.0, CloseReason::Unknown);
        no_profit.profit_usd = None;
        let report = analyze(vec![
            no_profit,
            closed_trade(2, "EURUSD", 1.0, CloseReason::TakeProfit),
        ]);

        assert_eq!(report.totals.analyzed_trades, 1);
        assert_eq!(report.anomalies.closed_missing_profit, 1);
        assert_eq!(report.anomalies.anomalous_count, 0);
    }

    #[test]
    fn test_empty_store_produces_neutral_report() {
        let report = analyze(vec![]);
        assert_eq!(report.totals.total_tickets, 0);
        assert_eq!(report.totals.win_rate, 0.0);
        assert!(report.symbols.is_empty());
        assert_eq!(report.strategy.sl_effectiveness, 0.0);
        assert_eq!(report.strategy.profit_lock_rate, 0.0);
        assert_eq!(report.risk.max_drawdown, 0.0);
    }
}
