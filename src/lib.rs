//! Intraday midnight-open fade engine for correlated index futures.
//!
//! The strategy anchors every session at the 00:00 ET open, waits for a
//! liquidity sweep of that level against the session bias, and fades it
//! once the primary instrument reclaims the anchor while the reference
//! instrument holds. Everything downstream of the signals is about
//! discipline: a forward-only session state machine enforcing one trade
//! per day, and a shadow-trade ledger that completes clean near-misses
//! through the same exit engine so each filter's opportunity cost can be
//! measured once enough real trades exist.

pub mod bars;
pub mod config;
pub mod data;
pub mod error;
pub mod exits;
pub mod gates;
pub mod session;
pub mod shadow;
pub mod signals;
pub mod strategy;
pub mod telemetry;

pub use bars::Bar;
pub use config::StrategyConfig;
pub use error::{AnalysisLocked, InvalidTransition, SignalError};
pub use exits::{Direction, ExitReason};
pub use gates::{FilterEvaluator, GateName, GateResult};
pub use session::{SessionState, SessionStateMachine};
pub use shadow::{Classification, ShadowTradeLedger, TradeKind, TradeRecord};
pub use signals::SignalEngine;
pub use strategy::{SessionOutcome, StrategyEngine};
pub use telemetry::{CsvSink, NullSink, RecordSink};
