//! Core data types used across the reconciliation and analytics engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Default lot size when the trade log did not report one
pub const DEFAULT_LOT_SIZE: f64 = 0.01;

/// Default stop-loss distance in pips
pub const DEFAULT_STOP_LOSS_PIPS: f64 = 0.0;

/// Default signal quality score
pub const DEFAULT_QUALITY_SCORE: f64 = 0.0;

/// Default spread/fees cost in USD
pub const DEFAULT_SPREAD_COST: f64 = 0.0;

/// Default risk per trade in USD
pub const DEFAULT_RISK_USD: f64 = 2.0;

/// Profit magnitude above which a trade is flagged as a data-capture error
pub const ANOMALY_THRESHOLD_USD: f64 = 10_000.0;

/// Nominal starting balance for the equity-curve replay
pub const STARTING_BALANCE_USD: f64 = 10_000.0;

/// Symbol used when a close event carries no symbol of its own
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Broker-assigned unique order identifier
pub type Ticket = u64;

// =============================================================================
// Enumerations
// =============================================================================

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Unknown,
}

impl Direction {
    /// Map the trade log's `trade_type` field to a direction.
    /// Unrecognized values map to `Unknown` rather than failing the record.
    pub fn from_trade_type(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Direction::Long,
            "SELL" | "SHORT" => Direction::Short,
            _ => Direction::Unknown,
        }
    }
}

/// Lifecycle state of a trade. Transitions Open -> Closed, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// How a trade was closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    /// Closed by some other bot logic; carries the method name from the log
    Other(String),
    Unknown,
}

impl CloseReason {
    /// SL/TP reasons come from the authoritative pattern and are never
    /// downgraded by a later generic close event.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, CloseReason::StopLoss | CloseReason::TakeProfit)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "SL"),
            CloseReason::TakeProfit => write!(f, "TP"),
            CloseReason::Other(method) => write!(f, "{}", method),
            CloseReason::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Canonical reconciled trade record, one per ticket.
///
/// Created on first sighting (an open record or an orphaned close event),
/// mutated field-by-field as further events arrive, finalized exactly once.
/// Optional metadata keeps `None` for "never reported"; the defaulted view
/// is available through the accessor methods so every consumer sees the
/// same completed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Option<f64>,
    pub close_price: Option<f64>,
    pub entry_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub lot_size: Option<f64>,
    pub stop_loss_pips: Option<f64>,
    pub quality_score: Option<f64>,
    pub spread_cost: Option<f64>,
    pub risk_usd: Option<f64>,
    pub status: TradeStatus,
    pub close_reason: CloseReason,
    pub profit_usd: Option<f64>,
    /// Computed at finalization; 0 when either timestamp is missing
    pub duration_seconds: i64,
    /// Profit magnitude exceeded the sanity threshold; retained but excluded
    /// from every aggregate metric
    pub anomalous: bool,
    /// Finalization produced a negative duration (clock/data error); the
    /// value is kept as computed, not clamped
    pub negative_duration: bool,
    /// Trade was created from an orphaned close event (no open record seen)
    pub synthesized: bool,
    /// Provenance bits: a generic close event supplied this field. The
    /// generic pattern is the authoritative carrier of profit/close_time,
    /// which makes the specific/generic merge commutative.
    #[serde(skip)]
    pub(crate) profit_from_generic: bool,
    #[serde(skip)]
    pub(crate) time_from_generic: bool,
}

impl Trade {
    /// Empty record for a freshly sighted ticket
    pub fn new(ticket: Ticket, symbol: impl Into<String>) -> Self {
        Trade {
            ticket,
            symbol: symbol.into(),
            direction: Direction::Unknown,
            entry_price: None,
            close_price: None,
            entry_time: None,
            close_time: None,
            lot_size: None,
            stop_loss_pips: None,
            quality_score: None,
            spread_cost: None,
            risk_usd: None,
            status: TradeStatus::Open,
            close_reason: CloseReason::Unknown,
            profit_usd: None,
            duration_seconds: 0,
            anomalous: false,
            negative_duration: false,
            synthesized: false,
            profit_from_generic: false,
            time_from_generic: false,
        }
    }

    pub fn lot_size(&self) -> f64 {
        self.lot_size.unwrap_or(DEFAULT_LOT_SIZE)
    }

    pub fn stop_loss_pips(&self) -> f64 {
        self.stop_loss_pips.unwrap_or(DEFAULT_STOP_LOSS_PIPS)
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score.unwrap_or(DEFAULT_QUALITY_SCORE)
    }

    pub fn spread_cost(&self) -> f64 {
        self.spread_cost.unwrap_or(DEFAULT_SPREAD_COST)
    }

    pub fn risk_usd(&self) -> f64 {
        self.risk_usd.unwrap_or(DEFAULT_RISK_USD)
    }

    /// Closed with a reported profit and not flagged anomalous: eligible for
    /// the aggregate metrics
    pub fn in_analysis_set(&self) -> bool {
        self.status == TradeStatus::Closed && self.profit_usd.is_some() && !self.anomalous
    }

    pub fn is_win(&self) -> bool {
        self.profit_usd.is_some_and(|p| p > 0.0)
    }

    pub fn is_loss(&self) -> bool {
        self.profit_usd.is_some_and(|p| p < 0.0)
    }

    pub fn is_breakeven(&self) -> bool {
        self.profit_usd.is_some_and(|p| p == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_trade_type() {
        assert_eq!(Direction::from_trade_type("BUY"), Direction::Long);
        assert_eq!(Direction::from_trade_type("buy"), Direction::Long);
        assert_eq!(Direction::from_trade_type("SELL"), Direction::Short);
        assert_eq!(Direction::from_trade_type("short"), Direction::Short);
        assert_eq!(Direction::from_trade_type("HEDGE"), Direction::Unknown);
    }

    #[test]
    fn test_metadata_defaults_applied_by_accessors() {
        let trade = Trade::new(1, "EURUSD");
        assert_eq!(trade.lot_size(), DEFAULT_LOT_SIZE);
        assert_eq!(trade.risk_usd(), DEFAULT_RISK_USD);
        assert_eq!(trade.quality_score(), DEFAULT_QUALITY_SCORE);
        assert_eq!(trade.spread_cost(), DEFAULT_SPREAD_COST);
        assert!(trade.quality_score.is_none(), "raw field stays unreported");
    }

    #[test]
    fn test_analysis_set_membership() {
        let mut trade = Trade::new(7, "GBPUSD");
        assert!(!trade.in_analysis_set(), "open trade is not analyzable");

        trade.status = TradeStatus::Closed;
        assert!(!trade.in_analysis_set(), "closed without profit is excluded");

        trade.profit_usd = Some(1.25);
        assert!(trade.in_analysis_set());

        trade.anomalous = true;
        assert!(!trade.in_analysis_set(), "anomalous trades never aggregate");
    }

    #[test]
    fn test_close_reason_authority() {
        assert!(CloseReason::StopLoss.is_authoritative());
        assert!(CloseReason::TakeProfit.is_authoritative());
        assert!(!CloseReason::Other("TrailingStop".to_string()).is_authoritative());
        assert!(!CloseReason::Unknown.is_authoritative());
    }
}
