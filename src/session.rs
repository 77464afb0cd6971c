//! Session state machine
//!
//! One instance per trading session. Transitions are validated against
//! a fixed forward-only table; an attempt outside the table is rejected,
//! reported, and leaves state and audit trail untouched. `SessionLocked`
//! and `OvernightRangeInvalid` flow back to `Idle` only through an
//! explicit new-session reset, never automatically, so a spent session
//! cannot silently reopen.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::InvalidTransition;

/// The closed set of session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Before the trading window opens
    Idle,
    /// Window open, overnight filter being checked
    SessionActive,
    /// Overnight-range gate failed; locked until daily reset
    OvernightRangeInvalid,
    /// Waiting for a qualifying sweep of the anchor
    AwaitingDisplacement,
    /// Sweep printed, checking displacement and divergence
    AwaitingDivergenceConfirmation,
    /// Divergence confirmed, waiting for the reclaim candle
    AwaitingReclaim,
    /// Position open
    InTrade,
    /// Done for the day, one way or another
    SessionLocked,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::SessionActive => write!(f, "SESSION_ACTIVE"),
            SessionState::OvernightRangeInvalid => write!(f, "OVERNIGHT_RANGE_INVALID"),
            SessionState::AwaitingDisplacement => write!(f, "AWAITING_DISPLACEMENT"),
            SessionState::AwaitingDivergenceConfirmation => {
                write!(f, "AWAITING_DIVERGENCE_CONFIRMATION")
            }
            SessionState::AwaitingReclaim => write!(f, "AWAITING_RECLAIM"),
            SessionState::InTrade => write!(f, "IN_TRADE"),
            SessionState::SessionLocked => write!(f, "SESSION_LOCKED"),
        }
    }
}

/// One immutable entry in the session's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub timestamp: DateTime<Utc>,
    pub from: SessionState,
    pub to: SessionState,
    pub reason: String,
    /// Optional numeric context, e.g. sweep depth at the transition
    pub context: Option<serde_json::Value>,
}

/// Why a trade entry is currently not allowed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryBlock {
    AlreadyInTrade,
    SessionLocked,
    OvernightRangeInvalid,
    MaxTradesReached { taken: u32, max: u32 },
    NotEligible { state: SessionState },
}

impl std::fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryBlock::AlreadyInTrade => write!(f, "already in trade"),
            EntryBlock::SessionLocked => write!(f, "session locked"),
            EntryBlock::OvernightRangeInvalid => write!(f, "overnight range filter failed"),
            EntryBlock::MaxTradesReached { taken, max } => {
                write!(f, "max trades reached ({taken}/{max})")
            }
            EntryBlock::NotEligible { state } => write!(f, "not in a tradeable state ({state})"),
        }
    }
}

/// Finite-state controller for one trading session
pub struct SessionStateMachine {
    state: SessionState,
    session_date: Option<NaiveDate>,
    trades_taken: u32,
    max_trades: u32,
    trail: Vec<TransitionRecord>,
}

impl SessionStateMachine {
    pub fn new(max_trades: u32) -> Self {
        Self {
            state: SessionState::Idle,
            session_date: None,
            trades_taken: 0,
            max_trades,
            trail: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        self.session_date
    }

    pub fn trades_taken(&self) -> u32 {
        self.trades_taken
    }

    /// Append-only audit trail of accepted transitions
    pub fn trail(&self) -> &[TransitionRecord] {
        &self.trail
    }

    /// Whether `from -> to` appears in the transition table.
    ///
    /// The two terminal day states reach `Idle` only through
    /// `reset_for_new_session`, so they map to nothing here.
    fn is_valid(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (from, to),
            (Idle, SessionActive)
                | (SessionActive, OvernightRangeInvalid)
                | (SessionActive, AwaitingDisplacement)
                | (AwaitingDisplacement, AwaitingDivergenceConfirmation)
                | (AwaitingDisplacement, SessionLocked)
                | (AwaitingDivergenceConfirmation, AwaitingReclaim)
                | (AwaitingDivergenceConfirmation, SessionLocked)
                | (AwaitingReclaim, InTrade)
                | (AwaitingReclaim, SessionLocked)
                | (InTrade, SessionLocked)
        )
    }

    /// Attempt a transition. Rejected attempts change nothing and are
    /// reported to the caller; accepted ones append one trail entry.
    pub fn transition_to(
        &mut self,
        to: SessionState,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
        context: Option<serde_json::Value>,
    ) -> Result<(), InvalidTransition> {
        if !Self::is_valid(self.state, to) {
            let err = InvalidTransition {
                from: self.state,
                to,
            };
            warn!(%err, "transition rejected");
            return Err(err);
        }

        let reason = reason.into();
        info!(from = %self.state, to = %to, %reason, "state transition");

        self.trail.push(TransitionRecord {
            timestamp,
            from: self.state,
            to,
            reason,
            context,
        });
        self.state = to;

        if to == SessionState::InTrade {
            self.trades_taken += 1;
            debug!(
                trades = self.trades_taken,
                max = self.max_trades,
                "trade counter incremented"
            );
        }

        Ok(())
    }

    /// Whether an entry is allowed right now, with the specific block
    /// reason when it is not.
    pub fn can_enter_trade(&self) -> Result<(), EntryBlock> {
        match self.state {
            SessionState::InTrade => return Err(EntryBlock::AlreadyInTrade),
            SessionState::SessionLocked => return Err(EntryBlock::SessionLocked),
            SessionState::OvernightRangeInvalid => {
                return Err(EntryBlock::OvernightRangeInvalid)
            }
            _ => {}
        }

        if self.trades_taken >= self.max_trades {
            return Err(EntryBlock::MaxTradesReached {
                taken: self.trades_taken,
                max: self.max_trades,
            });
        }

        match self.state {
            SessionState::AwaitingDisplacement
            | SessionState::AwaitingDivergenceConfirmation
            | SessionState::AwaitingReclaim => Ok(()),
            state => Err(EntryBlock::NotEligible { state }),
        }
    }

    /// Explicit daily reset: back to `Idle`, empty trail, zero trades.
    /// Idempotent; nothing carries over between sessions.
    pub fn reset_for_new_session(&mut self, date: NaiveDate) {
        self.state = SessionState::Idle;
        self.session_date = Some(date);
        self.trades_taken = 0;
        self.trail.clear();
        info!(%date, "state machine reset for new session");
    }
}
