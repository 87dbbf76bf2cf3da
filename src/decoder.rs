//! Event decoding for raw log lines
//!
//! Turns per-symbol trade-log records (one JSON object per line) and
//! free-text execution-log lines into typed events. Decoding is pure and
//! total: a malformed or non-matching line decodes to no event, never an
//! error, so a bad record cannot abort processing of the remaining file.
//!
//! Execution-log lines are anchored on a bracketed tag and matched against
//! two fixed patterns, tried in priority order:
//!
//! ```text
//! 2024-01-01 10:05:00 [EXECUTOR] SL hit for ticket 100 (EURUSD), profit: -2.00
//! 2024-01-01 11:10:00 [EXECUTOR] Closed position 101 (EURUSD) via TrailingStop at 1.1023, profit: 0.30, sl_hit: false, tp_hit: false
//! ```
//!
//! The SL/TP pattern is authoritative (it carries an explicit reason) and is
//! tried first; the generic pattern is never also applied to a line the
//! specific one matched. Filter decisions use their own tag:
//!
//! ```text
//! 2024-01-01 09:59:00 [FILTER] Signal rejected for EURUSD: spread too wide
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::types::{CloseReason, Direction, Ticket, UNKNOWN_SYMBOL};

/// Tag carried by every execution-log line the bot's executor writes
pub const EXECUTOR_TAG: &str = "[EXECUTOR]";

/// Tag carried by signal-filter decisions
pub const FILTER_TAG: &str = "[FILTER]";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

// =============================================================================
// Events
// =============================================================================

/// A single decoded log event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Opened(OpenEvent),
    /// Close with an explicit SL/TP reason; authoritative for the reason
    ClosedSpecific(SpecificCloseEvent),
    /// Close described by method name and hit flags; authoritative for
    /// profit and close time
    ClosedGeneric(GenericCloseEvent),
    FilterRejected(FilterEvent),
}

impl Event {
    /// Ticket this event refers to, if it refers to one
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            Event::Opened(e) => Some(e.ticket),
            Event::ClosedSpecific(e) => Some(e.ticket),
            Event::ClosedGeneric(e) => Some(e.ticket),
            Event::FilterRejected(_) => None,
        }
    }
}

/// Trade opened, decoded from a per-symbol trade-log record
#[derive(Debug, Clone, PartialEq)]
pub struct OpenEvent {
    pub ticket: Ticket,
    /// From the source tag (filename), never the record body
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Option<f64>,
    pub entry_time: DateTime<Utc>,
    pub lot_size: Option<f64>,
    pub stop_loss_pips: Option<f64>,
    pub quality_score: Option<f64>,
    pub spread_cost: Option<f64>,
    pub risk_usd: Option<f64>,
}

/// SL/TP hit, decoded from the specific execution-log pattern
#[derive(Debug, Clone, PartialEq)]
pub struct SpecificCloseEvent {
    pub ticket: Ticket,
    pub symbol: String,
    /// Always `StopLoss` or `TakeProfit`
    pub reason: CloseReason,
    pub profit_usd: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
}

/// Position closed, decoded from the generic execution-log pattern
#[derive(Debug, Clone, PartialEq)]
pub struct GenericCloseEvent {
    pub ticket: Ticket,
    pub symbol: String,
    pub method: Option<String>,
    pub close_price: Option<f64>,
    pub profit_usd: Option<f64>,
    pub sl_hit: bool,
    pub tp_hit: bool,
    pub close_time: Option<DateTime<Utc>>,
}

/// Signal declined by a pre-trade filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEvent {
    pub symbol: String,
    pub reason: String,
    pub time: Option<DateTime<Utc>>,
}

// =============================================================================
// Trade-log decoding (structured JSON lines)
// =============================================================================

/// On-disk shape of one trade-log record
#[derive(Debug, Deserialize)]
struct OpenRecord {
    status: String,
    order_id: i64,
    #[serde(default)]
    trade_type: Option<String>,
    #[serde(default)]
    entry_price: Option<f64>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    additional_info: AdditionalInfo,
}

#[derive(Debug, Default, Deserialize)]
struct AdditionalInfo {
    #[serde(default)]
    lot_size: Option<f64>,
    #[serde(default)]
    stop_loss_pips: Option<f64>,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    spread_fees_cost: Option<f64>,
    #[serde(default)]
    risk_usd: Option<f64>,
}

/// Decode one trade-log line for the symbol the file belongs to.
///
/// Requires `status == "OPEN"`, a positive order id, and a parseable entry
/// timestamp; any of these failing voids the whole record.
pub fn decode_trade_log_line(line: &str, symbol: &str) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let record: OpenRecord = serde_json::from_str(line).ok()?;

    if record.status != "OPEN" {
        return None;
    }
    if record.order_id <= 0 {
        return None;
    }

    // Entry time is mandatory; a parse failure voids the record entirely
    let entry_time = parse_timestamp(record.timestamp.as_deref()?)?;

    let direction = record
        .trade_type
        .as_deref()
        .map(Direction::from_trade_type)
        .unwrap_or(Direction::Unknown);

    Some(Event::Opened(OpenEvent {
        ticket: record.order_id as Ticket,
        symbol: symbol.to_string(),
        direction,
        entry_price: record.entry_price,
        entry_time,
        lot_size: record.additional_info.lot_size,
        stop_loss_pips: record.additional_info.stop_loss_pips,
        quality_score: record.additional_info.quality_score,
        spread_cost: record.additional_info.spread_fees_cost,
        risk_usd: record.additional_info.risk_usd,
    }))
}

// =============================================================================
// Execution-log decoding (free text)
// =============================================================================

/// Decode one execution-log line.
///
/// The specific SL/TP pattern is tried first and, when its anchor is
/// present, the generic pattern is not attempted for the same line.
pub fn decode_execution_line(line: &str) -> Option<Event> {
    if line.contains(EXECUTOR_TAG) {
        if line.contains(" SL hit for ticket ") || line.contains(" TP hit for ticket ") {
            return decode_specific_close(line);
        }
        if line.contains("Closed position ") {
            return decode_generic_close(line);
        }
        return None;
    }
    if line.contains(FILTER_TAG) {
        return decode_filter_rejection(line);
    }
    None
}

fn decode_specific_close(line: &str) -> Option<Event> {
    let (reason, anchor) = if line.contains(" SL hit for ticket ") {
        (CloseReason::StopLoss, " SL hit for ticket ")
    } else {
        (CloseReason::TakeProfit, " TP hit for ticket ")
    };

    let (ticket, after) = ticket_after(line, anchor)?;

    Some(Event::ClosedSpecific(SpecificCloseEvent {
        ticket,
        symbol: symbol_in_parens(&line[after..]).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
        reason,
        profit_usd: number_after(line, "profit"),
        close_time: extract_timestamp(line),
    }))
}

fn decode_generic_close(line: &str) -> Option<Event> {
    let (ticket, after) = ticket_after(line, "Closed position ")?;
    let tail = &line[after..];

    Some(Event::ClosedGeneric(GenericCloseEvent {
        ticket,
        symbol: symbol_in_parens(tail).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
        method: word_after(tail, " via "),
        close_price: number_after(tail, " at "),
        profit_usd: number_after(tail, "profit"),
        sl_hit: bool_after(tail, "sl_hit").unwrap_or(false),
        tp_hit: bool_after(tail, "tp_hit").unwrap_or(false),
        close_time: extract_timestamp(line),
    }))
}

fn decode_filter_rejection(line: &str) -> Option<Event> {
    let idx = line.find("rejected for ")?;
    let tail = &line[idx + "rejected for ".len()..];

    let symbol: String = tail
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
        .collect();
    if symbol.is_empty() {
        return None;
    }

    let reason = tail[symbol.len()..]
        .trim_start_matches([':', ' '])
        .trim()
        .to_string();

    Some(Event::FilterRejected(FilterEvent {
        symbol,
        reason,
        time: extract_timestamp(line),
    }))
}

// =============================================================================
// Field extraction helpers
// =============================================================================

/// Parse a `YYYY-MM-DD HH:MM:SS` string, assumed UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        .ok()
}

/// Scan a line for the first `YYYY-MM-DD HH:MM:SS` substring, wherever it
/// appears
pub fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let bytes = line.as_bytes();
    if bytes.len() < TIMESTAMP_LEN {
        return None;
    }
    for start in 0..=(bytes.len() - TIMESTAMP_LEN) {
        if !bytes[start].is_ascii_digit() {
            continue;
        }
        if let Some(window) = line.get(start..start + TIMESTAMP_LEN) {
            if let Some(ts) = parse_timestamp(window) {
                return Some(ts);
            }
        }
    }
    None
}

/// Positive integer directly following `anchor`; returns the ticket and the
/// byte index just past it so later fields can be scoped to the tail
fn ticket_after(line: &str, anchor: &str) -> Option<(Ticket, usize)> {
    let idx = line.find(anchor)? + anchor.len();
    let tail = &line[idx..];
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    let ticket: Ticket = digits.parse().ok()?;
    if ticket == 0 {
        return None;
    }
    Some((ticket, idx + digits.len()))
}

/// First parenthesized instrument token, e.g. `(EURUSD)`
fn symbol_in_parens(segment: &str) -> Option<String> {
    let open = segment.find('(')?;
    let rest = &segment[open + 1..];
    let close = rest.find(')')?;
    let token = rest[..close].trim();
    if token.is_empty()
        || !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return None;
    }
    Some(token.to_string())
}

/// Signed decimal following `key`, tolerating `key: x`, `key= x`, `key x`
fn number_after(segment: &str, key: &str) -> Option<f64> {
    let idx = segment.find(key)? + key.len();
    let tail = segment[idx..].trim_start_matches([':', '=', ' ']);
    let token: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '+' || *c == '.')
        .collect();
    token.parse().ok()
}

/// `true`/`false` following `key`
fn bool_after(segment: &str, key: &str) -> Option<bool> {
    let idx = segment.find(key)? + key.len();
    let tail = segment[idx..].trim_start_matches([':', '=', ' ']);
    if tail.get(..4).is_some_and(|s| s.eq_ignore_ascii_case("true")) {
        Some(true)
    } else if tail.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("false")) {
        Some(false)
    } else {
        None
    }
}

/// Bare word following `key` (closure method names and the like)
fn word_after(segment: &str, key: &str) -> Option<String> {
    let idx = segment.find(key)? + key.len();
    let word: String = segment[idx..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word)
    }
}
