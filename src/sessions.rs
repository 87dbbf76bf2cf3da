//! Time-of-day and trading-session performance
//!
//! Buckets closed trades by the hour of their close time, then aggregates
//! the hourly buckets into the three broker sessions. Sessions are half-open
//! clock windows and are not a partition of the day: the Asian and American
//! windows overlap the neighbouring ones at hours 22 and 13, so a close in
//! an overlap hour counts toward both sessions.

use std::collections::BTreeMap;

use chrono::Timelike;
use serde::Serialize;

use crate::types::Trade;

/// Broker session windows as half-open `[start, end)` hour ranges,
/// wrapping over midnight where needed
pub const SESSION_WINDOWS: [(&str, u32, u32); 3] = [
    ("Asian", 22, 6),
    ("European", 6, 14),
    ("American", 13, 23),
];

/// Aggregates for one hour-of-day bucket
#[derive(Debug, Clone, Default, Serialize)]
pub struct HourlyStats {
    pub trade_count: usize,
    pub wins: usize,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub win_rate: f64,
}

impl HourlyStats {
    fn add_trade(&mut self, profit: f64) {
        self.trade_count += 1;
        if profit > 0.0 {
            self.wins += 1;
        }
        self.total_profit += profit;
        self.avg_profit = self.total_profit / self.trade_count as f64;
        self.win_rate = (self.wins as f64 / self.trade_count as f64) * 100.0;
    }
}

/// Aggregates for one named session window
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
    pub trade_count: usize,
    pub wins: usize,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub win_rate: f64,
}

/// Hour-of-day and session snapshot for one analysis run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimePerformance {
    /// Hour (0-23) of `close_time` -> stats; hours with no trades are absent
    pub hourly: BTreeMap<u32, HourlyStats>,
    pub sessions: Vec<SessionStats>,
}

/// Does the half-open window `[start, end)` contain `hour`, wrapping over
/// midnight when `start > end`?
pub fn session_contains(start: u32, end: u32, hour: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Bucket the analysis set by close hour and aggregate the session windows
pub fn compute_time_performance(trades: &[&Trade]) -> TimePerformance {
    let mut hourly: BTreeMap<u32, HourlyStats> = BTreeMap::new();

    for trade in trades {
        let (Some(close_time), Some(profit)) = (trade.close_time, trade.profit_usd) else {
            continue;
        };
        hourly
            .entry(close_time.hour())
            .or_default()
            .add_trade(profit);
    }

    let sessions = SESSION_WINDOWS
        .iter()
        .map(|(name, start, end)| {
            let mut trade_count = 0;
            let mut wins = 0;
            let mut total_profit = 0.0;

            for (hour, stats) in &hourly {
                if session_contains(*start, *end, *hour) {
                    trade_count += stats.trade_count;
                    wins += stats.wins;
                    total_profit += stats.total_profit;
                }
            }

            SessionStats {
                name: name.to_string(),
                start_hour: *start,
                end_hour: *end,
                trade_count,
                wins,
                total_profit,
                avg_profit: if trade_count > 0 {
                    total_profit / trade_count as f64
                } else {
                    0.0
                },
                win_rate: if trade_count > 0 {
                    (wins as f64 / trade_count as f64) * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    TimePerformance { hourly, sessions }
}
