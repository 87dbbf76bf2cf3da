//! Ticket-keyed trade store and merge policy
//!
//! Holds exactly one canonical [`Trade`] per ticket and owns the rules for
//! merging partial and conflicting evidence. `apply` is idempotent with
//! respect to re-application of the same event content, and the
//! specific/generic close merge is commutative: the specific pattern is
//! authoritative for the close reason, the generic pattern for profit and
//! close time, so the final trade is identical whichever arrives first.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::decoder::{Event, GenericCloseEvent, OpenEvent, SpecificCloseEvent};
use crate::types::{CloseReason, Direction, Ticket, Trade, TradeStatus, UNKNOWN_SYMBOL};

/// Owned store of reconciled trades, keyed by ticket
#[derive(Debug, Default)]
pub struct TradeStore {
    trades: BTreeMap<Ticket, Trade>,
    finalized: bool,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single entry point for decoded events.
    ///
    /// Filter events carry no ticket and leave the store untouched; the
    /// reconciler counts them separately.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Opened(open) => self.apply_open(open),
            Event::ClosedSpecific(close) => self.apply_specific_close(close),
            Event::ClosedGeneric(close) => self.apply_generic_close(close),
            Event::FilterRejected(_) => {}
        }
    }

    fn apply_open(&mut self, event: &OpenEvent) {
        let trade = self
            .trades
            .entry(event.ticket)
            .or_insert_with(|| Trade::new(event.ticket, event.symbol.clone()));

        // Tickets are unique broker order ids, so a second open for the same
        // ticket is unexpected: fill only still-unset fields and never touch
        // the profit data of an already-closed trade.
        if trade.status == TradeStatus::Closed {
            debug!(ticket = event.ticket, "open record arrived after close");
        }

        if trade.symbol == UNKNOWN_SYMBOL && event.symbol != UNKNOWN_SYMBOL {
            trade.symbol = event.symbol.clone();
        }
        if trade.direction == Direction::Unknown {
            trade.direction = event.direction;
        }
        fill(&mut trade.entry_price, event.entry_price);
        if trade.entry_time.is_none() {
            trade.entry_time = Some(event.entry_time);
        }
        fill(&mut trade.lot_size, event.lot_size);
        fill(&mut trade.stop_loss_pips, event.stop_loss_pips);
        fill(&mut trade.quality_score, event.quality_score);
        fill(&mut trade.spread_cost, event.spread_cost);
        fill(&mut trade.risk_usd, event.risk_usd);
    }

    fn apply_specific_close(&mut self, event: &SpecificCloseEvent) {
        let trade = self.entry_for_close(event.ticket, &event.symbol);

        trade.status = TradeStatus::Closed;
        // The SL/TP pattern carries strictly more information about the
        // reason than the generic pattern and always wins.
        trade.close_reason = event.reason.clone();

        // Profit and close time yield to a generic event for the same
        // ticket, whether it already arrived or arrives later.
        if let Some(profit) = event.profit_usd {
            if !trade.profit_from_generic {
                trade.profit_usd = Some(profit);
            }
        }
        if let Some(time) = event.close_time {
            if !trade.time_from_generic {
                trade.close_time = Some(time);
            }
        }
        if trade.symbol == UNKNOWN_SYMBOL && event.symbol != UNKNOWN_SYMBOL {
            trade.symbol = event.symbol.clone();
        }
    }

    fn apply_generic_close(&mut self, event: &GenericCloseEvent) {
        let trade = self.entry_for_close(event.ticket, &event.symbol);

        trade.status = TradeStatus::Closed;

        if !trade.close_reason.is_authoritative() {
            trade.close_reason = if event.sl_hit {
                CloseReason::StopLoss
            } else if event.tp_hit {
                CloseReason::TakeProfit
            } else if let Some(method) = &event.method {
                CloseReason::Other(method.clone())
            } else {
                CloseReason::Unknown
            };
        }

        if let Some(profit) = event.profit_usd {
            trade.profit_usd = Some(profit);
            trade.profit_from_generic = true;
        }
        if let Some(time) = event.close_time {
            trade.close_time = Some(time);
            trade.time_from_generic = true;
        }
        fill(&mut trade.close_price, event.close_price);
        if trade.symbol == UNKNOWN_SYMBOL && event.symbol != UNKNOWN_SYMBOL {
            trade.symbol = event.symbol.clone();
        }
    }

    /// Look up the trade for a close event, synthesizing one when the open
    /// record was never seen (log rotation, lost line). The degradation is
    /// deliberate and auditable via the `synthesized` flag; `entry_time`
    /// defaults to the final close time during finalization.
    fn entry_for_close(&mut self, ticket: Ticket, symbol: &str) -> &mut Trade {
        self.trades.entry(ticket).or_insert_with(|| {
            debug!(ticket, "close event for unknown ticket, synthesizing trade");
            let mut trade = Trade::new(ticket, symbol);
            trade.synthesized = true;
            trade
        })
    }

    /// One-shot finalization pass: compute durations, flag data-integrity
    /// problems. Runs once; later calls are no-ops.
    pub fn finalize(&mut self, anomaly_threshold: f64) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        for trade in self.trades.values_mut() {
            if trade.status != TradeStatus::Closed {
                continue;
            }

            if trade.synthesized && trade.entry_time.is_none() {
                trade.entry_time = trade.close_time;
            }

            trade.duration_seconds = match (trade.entry_time, trade.close_time) {
                (Some(entry), Some(close)) => {
                    let secs = (close - entry).num_seconds();
                    if secs < 0 {
                        warn!(
                            ticket = trade.ticket,
                            duration = secs,
                            "negative trade duration, flagging as data error"
                        );
                        trade.negative_duration = true;
                    }
                    secs
                }
                _ => 0,
            };

            if let Some(profit) = trade.profit_usd {
                if profit.abs() > anomaly_threshold {
                    warn!(
                        ticket = trade.ticket,
                        profit, "implausible profit magnitude, flagging as anomalous"
                    );
                    trade.anomalous = true;
                }
            }
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn get(&self, ticket: Ticket) -> Option<&Trade> {
        self.trades.get(&ticket)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// All trades in ascending ticket order
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }

    /// Seed a fully-formed trade, bypassing the merge policy
    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, trade: Trade) {
        self.trades.insert(trade.ticket, trade);
    }
}

fn fill(slot: &mut Option<f64>, value: Option<f64>) {
    if slot.is_none() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::parse_timestamp;
    use crate::types::{Direction, ANOMALY_THRESHOLD_USD};

    fn open_event(ticket: Ticket, symbol: &str, ts: &str) -> Event {
        Event::Opened(OpenEvent {
            ticket,
            symbol: symbol.to_string(),
            direction: Direction::Long,
            entry_price: Some(1.1),
            entry_time: parse_timestamp(ts).unwrap(),
            lot_size: Some(0.02),
            stop_loss_pips: Some(15.0),
            quality_score: Some(80.0),
            spread_cost: Some(0.1),
            risk_usd: Some(2.0),
        })
    }

    fn specific_close(ticket: Ticket, reason: CloseReason, profit: f64, ts: &str) -> Event {
        Event::ClosedSpecific(SpecificCloseEvent {
            ticket,
            symbol: "EURUSD".to_string(),
            reason,
            profit_usd: Some(profit),
            close_time: parse_timestamp(ts),
        })
    }

    fn generic_close(ticket: Ticket, method: &str, profit: f64, ts: &str) -> Event {
        Event::ClosedGeneric(GenericCloseEvent {
            ticket,
            symbol: "EURUSD".to_string(),
            method: Some(method.to_string()),
            close_price: None,
            profit_usd: Some(profit),
            sl_hit: false,
            tp_hit: false,
            close_time: parse_timestamp(ts),
        })
    }

    #[test]
    fn test_open_creates_trade() {
        let mut store = TradeStore::new();
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));

        let trade = store.get(100).unwrap();
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.symbol, "EURUSD");
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.entry_price, Some(1.1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reapplying_same_open_is_idempotent() {
        let mut store = TradeStore::new();
        let event = open_event(100, "EURUSD", "2024-01-01 10:00:00");
        store.apply(&event);
        let first = store.get(100).unwrap().clone();

        store.apply(&event);
        assert_eq!(store.len(), 1);
        assert_eq!(*store.get(100).unwrap(), first);
    }

    #[test]
    fn test_duplicate_open_fills_only_unset_fields() {
        let mut store = TradeStore::new();
        store.apply(&Event::Opened(OpenEvent {
            ticket: 100,
            symbol: "EURUSD".to_string(),
            direction: Direction::Long,
            entry_price: Some(1.1),
            entry_time: parse_timestamp("2024-01-01 10:00:00").unwrap(),
            lot_size: None,
            stop_loss_pips: None,
            quality_score: None,
            spread_cost: None,
            risk_usd: None,
        }));

        // Second open with a different price and new metadata: price must
        // survive, metadata gaps get filled
        store.apply(&Event::Opened(OpenEvent {
            ticket: 100,
            symbol: "EURUSD".to_string(),
            direction: Direction::Long,
            entry_price: Some(9.9),
            entry_time: parse_timestamp("2024-01-01 11:00:00").unwrap(),
            lot_size: Some(0.05),
            stop_loss_pips: None,
            quality_score: None,
            spread_cost: None,
            risk_usd: None,
        }));

        let trade = store.get(100).unwrap();
        assert_eq!(trade.entry_price, Some(1.1));
        assert_eq!(trade.entry_time, parse_timestamp("2024-01-01 10:00:00"));
        assert_eq!(trade.lot_size, Some(0.05));
    }

    #[test]
    fn test_late_open_never_touches_closed_profit() {
        let mut store = TradeStore::new();
        store.apply(&generic_close(100, "Manual", 3.25, "2024-01-01 12:00:00"));
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));

        let trade = store.get(100).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.profit_usd, Some(3.25));
        assert_eq!(trade.entry_time, parse_timestamp("2024-01-01 10:00:00"));
    }

    #[test]
    fn test_close_known_ticket() {
        let mut store = TradeStore::new();
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));
        store.apply(&specific_close(
            100,
            CloseReason::StopLoss,
            -2.0,
            "2024-01-01 10:05:00",
        ));

        let trade = store.get(100).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.close_reason, CloseReason::StopLoss);
        assert_eq!(trade.profit_usd, Some(-2.0));
        assert_eq!(trade.close_time, parse_timestamp("2024-01-01 10:05:00"));
        assert!(!trade.synthesized);
    }

    #[test]
    fn test_specific_generic_merge_is_commutative() {
        let open = open_event(100, "EURUSD", "2024-01-01 10:00:00");
        let specific = specific_close(100, CloseReason::StopLoss, -2.05, "2024-01-01 10:05:00");
        let generic = generic_close(100, "StopOut", -2.01, "2024-01-01 10:05:03");

        let mut a = TradeStore::new();
        a.apply(&open);
        a.apply(&specific);
        a.apply(&generic);
        a.finalize(ANOMALY_THRESHOLD_USD);

        let mut b = TradeStore::new();
        b.apply(&open);
        b.apply(&generic);
        b.apply(&specific);
        b.finalize(ANOMALY_THRESHOLD_USD);

        let ta = a.get(100).unwrap();
        let tb = b.get(100).unwrap();
        assert_eq!(ta, tb);

        // The reason comes from the specific pattern, profit and close time
        // from the generic one
        assert_eq!(ta.close_reason, CloseReason::StopLoss);
        assert_eq!(ta.profit_usd, Some(-2.01));
        assert_eq!(ta.close_time, parse_timestamp("2024-01-01 10:05:03"));
    }

    #[test]
    fn test_generic_never_downgrades_sl_reason() {
        let mut store = TradeStore::new();
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));
        store.apply(&specific_close(
            100,
            CloseReason::TakeProfit,
            4.0,
            "2024-01-01 10:05:00",
        ));
        store.apply(&generic_close(100, "Manual", 3.98, "2024-01-01 10:05:02"));

        let trade = store.get(100).unwrap();
        assert_eq!(trade.close_reason, CloseReason::TakeProfit);
        // but the generic event still updates the precise P&L
        assert_eq!(trade.profit_usd, Some(3.98));
    }

    #[test]
    fn test_generic_hit_flags_map_to_reasons() {
        let mut store = TradeStore::new();
        store.apply(&Event::ClosedGeneric(GenericCloseEvent {
            ticket: 7,
            symbol: "USDJPY".to_string(),
            method: Some("Manual".to_string()),
            close_price: None,
            profit_usd: Some(-1.9),
            sl_hit: true,
            tp_hit: false,
            close_time: parse_timestamp("2024-01-01 10:00:00"),
        }));

        assert_eq!(store.get(7).unwrap().close_reason, CloseReason::StopLoss);
    }

    #[test]
    fn test_orphan_close_synthesizes_trade() {
        let mut store = TradeStore::new();
        store.apply(&generic_close(999, "TrailingStop", 0.45, "2024-01-01 12:00:00"));
        store.finalize(ANOMALY_THRESHOLD_USD);

        let trade = store.get(999).unwrap();
        assert!(trade.synthesized);
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.entry_time, trade.close_time);
        assert_eq!(trade.duration_seconds, 0);
        assert_eq!(trade.profit_usd, Some(0.45));
    }

    #[test]
    fn test_finalize_computes_duration() {
        let mut store = TradeStore::new();
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));
        store.apply(&specific_close(
            100,
            CloseReason::StopLoss,
            -2.0,
            "2024-01-01 10:05:00",
        ));
        store.finalize(ANOMALY_THRESHOLD_USD);

        assert_eq!(store.get(100).unwrap().duration_seconds, 300);
        assert!(!store.get(100).unwrap().negative_duration);
    }

    #[test]
    fn test_finalize_flags_negative_duration_without_clamping() {
        let mut store = TradeStore::new();
        store.apply(&open_event(100, "EURUSD", "2024-01-01 10:00:00"));
        store.apply(&specific_close(
            100,
            CloseReason::StopLoss,
            -2.0,
            "2024-01-01 09:00:00",
        ));
        store.finalize(ANOMALY_THRESHOLD_USD);

        let trade = store.get(100).unwrap();
        assert_eq!(trade.duration_seconds, -3600);
        assert!(trade.negative_duration);
    }

    #[test]
    fn test_finalize_flags_anomalous_profit() {
        let mut store = TradeStore::new();
        store.apply(&generic_close(1, "Manual", 55_000.0, "2024-01-01 12:00:00"));
        store.apply(&generic_close(2, "Manual", -12_345.0, "2024-01-01 13:00:00"));
        store.apply(&generic_close(3, "Manual", 9_999.0, "2024-01-01 14:00:00"));
        store.finalize(ANOMALY_THRESHOLD_USD);

        assert!(store.get(1).unwrap().anomalous);
        assert!(store.get(2).unwrap().anomalous);
        assert!(!store.get(3).unwrap().anomalous);
    }

    #[test]
    fn test_finalize_runs_once() {
        let mut store = TradeStore::new();
        store.apply(&generic_close(1, "Manual", 1.0, "2024-01-01 12:00:00"));
        store.finalize(ANOMALY_THRESHOLD_USD);
        // A second pass with a tighter threshold must not re-flag anything
        store.finalize(0.5);
        assert!(!store.get(1).unwrap().anomalous);
    }
}
