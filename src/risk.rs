//! Risk and drawdown metrics
//!
//! Replays the closed, non-anomalous trades in chronological close order
//! from a fixed nominal balance and derives equity-curve statistics:
//! running peak, maximum drawdown with its episode window and recovery-time
//! estimate, and consecutive-loss streaks. The chronological ordering is
//! load-bearing; trades without a close time cannot be sequenced and are
//! excluded from the replay (their count is reported).

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::types::Trade;

/// Equity-curve and streak statistics for one analysis run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskMetrics {
    pub starting_balance: f64,
    pub final_equity: f64,
    pub peak_equity: f64,
    /// Largest peak-to-trough decline, in account currency
    pub max_drawdown: f64,
    /// Largest decline as a percentage of the peak it fell from
    pub max_drawdown_pct: f64,
    /// First close below the peak in the worst episode
    pub drawdown_start: Option<DateTime<Utc>>,
    /// Close at which the worst drawdown was reached
    pub drawdown_end: Option<DateTime<Utc>>,
    /// Length of the worst episode in hours
    pub recovery_hours: Option<f64>,
    pub max_loss_streak: usize,
    pub avg_loss_streak: f64,
    /// Every completed run of consecutive losing trades, in replay order
    pub loss_streaks: Vec<usize>,
    /// Trades that took part in the replay
    pub replayed_trades: usize,
    /// Closed trades with profit but no close time; not sequenceable
    pub unsequenced_trades: usize,
    /// Balance after each replayed close, in replay order
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

/// Running equity state for the chronological replay
#[derive(Debug)]
struct EquityTracker {
    equity: f64,
    peak: f64,
    max_drawdown: f64,
    max_drawdown_pct: f64,
    episode_start: Option<DateTime<Utc>>,
    drawdown_start: Option<DateTime<Utc>>,
    drawdown_end: Option<DateTime<Utc>>,
    consecutive_losses: usize,
    loss_streaks: Vec<usize>,
    equity_curve: Vec<(DateTime<Utc>, f64)>,
}

impl EquityTracker {
    fn new(starting_balance: f64) -> Self {
        EquityTracker {
            equity: starting_balance,
            peak: starting_balance,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            episode_start: None,
            drawdown_start: None,
            drawdown_end: None,
            consecutive_losses: 0,
            loss_streaks: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    fn record_trade(&mut self, close_time: DateTime<Utc>, profit: f64) {
        self.equity += profit;
        self.equity_curve.push((close_time, self.equity));

        if self.equity > self.peak {
            // New high water mark ends the current drawdown episode
            self.peak = self.equity;
            self.episode_start = None;
        } else {
            let drawdown = self.peak - self.equity;
            if drawdown > 0.0 && self.episode_start.is_none() {
                self.episode_start = Some(close_time);
            }
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
                self.max_drawdown_pct = if self.peak > 0.0 {
                    (drawdown / self.peak) * 100.0
                } else {
                    0.0
                };
                self.drawdown_start = self.episode_start;
                self.drawdown_end = Some(close_time);
            }
        }

        if profit < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.end_loss_streak();
        }
    }

    fn end_loss_streak(&mut self) {
        if self.consecutive_losses > 0 {
            self.loss_streaks.push(self.consecutive_losses);
            self.consecutive_losses = 0;
        }
    }

    fn finish(mut self, starting_balance: f64, unsequenced: usize) -> RiskMetrics {
        // A streak still running at the end of the replay counts too
        self.end_loss_streak();

        let recovery_hours = match (self.drawdown_start, self.drawdown_end) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 3600.0),
            _ => None,
        };

        let max_loss_streak = self.loss_streaks.iter().copied().max().unwrap_or(0);
        let avg_loss_streak = if self.loss_streaks.is_empty() {
            0.0
        } else {
            self.loss_streaks.iter().map(|s| *s as f64).mean()
        };

        RiskMetrics {
            starting_balance,
            final_equity: self.equity,
            peak_equity: self.peak,
            max_drawdown: self.max_drawdown,
            max_drawdown_pct: self.max_drawdown_pct,
            drawdown_start: self.drawdown_start,
            drawdown_end: self.drawdown_end,
            recovery_hours,
            max_loss_streak,
            avg_loss_streak,
            replayed_trades: self.equity_curve.len(),
            unsequenced_trades: unsequenced,
            loss_streaks: self.loss_streaks,
            equity_curve: self.equity_curve,
        }
    }
}

/// Simulate the equity curve over the analysis set.
///
/// Trades are sorted ascending by close time, ties broken by ticket so the
/// replay is deterministic.
pub fn compute_risk_metrics(trades: &[&Trade], starting_balance: f64) -> RiskMetrics {
    let mut sequenced: Vec<(DateTime<Utc>, u64, f64)> = Vec::with_capacity(trades.len());
    let mut unsequenced = 0usize;

    for trade in trades {
        let Some(profit) = trade.profit_usd else {
            continue;
        };
        match trade.close_time {
            Some(close_time) => sequenced.push((close_time, trade.ticket, profit)),
            None => unsequenced += 1,
        }
    }

    sequenced.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut tracker = EquityTracker::new(starting_balance);
    for (close_time, _, profit) in sequenced {
        tracker.record_trade(close_time, profit);
    }
    tracker.finish(starting_balance, unsequenced)
}
