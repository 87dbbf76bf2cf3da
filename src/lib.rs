//! Trade Forensics
//!
//! Reconstructs a consistent per-ticket trade lifecycle from a trading
//! bot's append-only logs (structured per-symbol open records plus a
//! free-text execution log) and derives performance, risk, and behavioral
//! analytics from the reconstruction.
//!
//! The pipeline is strictly one-directional: log lines are decoded into
//! typed events, events are merged into a ticket-keyed trade store, the
//! finalized store feeds the analytics engine, and the resulting report is
//! rendered or serialized.
//!
//! ## Example
//! ```no_run
//! use trade_forensics::{AnalyticsEngine, Config, Reconciler};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let outcome = Reconciler::new(
//!         &config.inputs.trade_log_dir,
//!         &config.inputs.execution_log,
//!         config.analysis.anomaly_threshold,
//!     )
//!     .run()?;
//!
//!     let report = AnalyticsEngine::new(config.analysis).analyze(&outcome.store, outcome.stats);
//!     println!("{}", report.render());
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod decoder;
pub mod reconcile;
pub mod report;
pub mod risk;
pub mod sessions;
pub mod store;
pub mod types;

pub use analytics::AnalyticsEngine;
pub use config::Config;
pub use decoder::Event;
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
pub use report::AnalysisReport;
pub use store::TradeStore;
pub use types::*;
