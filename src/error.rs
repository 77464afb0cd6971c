//! Error taxonomy for the decision core
//!
//! Core failures are typed and carry enough context for the caller to
//! decide the next action. None of them are retried inside the core:
//! a signal failure abandons the session, a rejected transition leaves
//! state untouched, and a locked ledger stays locked.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::session::SessionState;

/// Failures raised by signal computations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// A required instant has no bar. Never recovered by substituting
    /// data; the caller decides whether to skip the session.
    #[error("{symbol}: no bar at {instant} ({what})")]
    DataGap {
        symbol: String,
        instant: DateTime<Utc>,
        what: String,
    },

    /// Not enough trailing complete days for a rolling computation.
    #[error("insufficient history: need {needed} complete days, have {available}")]
    InsufficientHistory { needed: usize, available: usize },
}

/// A requested state change is not in the transition table.
///
/// The state machine rejects the attempt locally and leaves the current
/// state and audit trail unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to}; state left unchanged")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Shadow-trade analysis requested before enough real trades exist.
///
/// Intentional guardrail against small-sample overreaction. There is no
/// override path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("shadow review locked: {real_trades}/{required} real trades recorded")]
pub struct AnalysisLocked {
    pub real_trades: usize,
    pub required: usize,
}
