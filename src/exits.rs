//! Trade plans and exit evaluation
//!
//! This is the only exit implementation in the crate. Real positions
//! and shadow (virtual) setups both run through `check_exit` /
//! `simulate`, so filter-attribution comparisons stay meaningful: a
//! shadow outcome is exactly what the real trade would have done.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bars::Bar;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Entry, stop and target for one (real or virtual) trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    /// Initial risk in points (entry to stop)
    pub risk_points: f64,
}

/// Build a plan from the reclaim entry and the sweep extreme.
///
/// Stop sits `stop_buffer` beyond the extreme; target is `target_r`
/// times the initial risk from entry.
pub fn build_plan(
    direction: Direction,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    sweep_extreme: f64,
    stop_buffer: f64,
    target_r: f64,
) -> TradePlan {
    let (stop_loss, risk_points, target) = match direction {
        Direction::Long => {
            let stop = sweep_extreme - stop_buffer;
            let risk = entry_price - stop;
            (stop, risk, entry_price + risk * target_r)
        }
        Direction::Short => {
            let stop = sweep_extreme + stop_buffer;
            let risk = stop - entry_price;
            (stop, risk, entry_price - risk * target_r)
        }
    };

    TradePlan {
        direction,
        entry_time,
        entry_price,
        stop_loss,
        target,
        risk_points,
    }
}

/// Why a trade closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Stop,
    Target,
    SessionClose,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Stop => write!(f, "STOP"),
            ExitReason::Target => write!(f, "TARGET"),
            ExitReason::SessionClose => write!(f, "SESSION_CLOSE"),
        }
    }
}

/// A completed exit with its P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub reason: ExitReason,
    pub pnl_points: f64,
    pub pnl_r: f64,
    pub win: bool,
}

fn exit_event(plan: &TradePlan, time: DateTime<Utc>, price: f64, reason: ExitReason) -> ExitEvent {
    let pnl_points = match plan.direction {
        Direction::Long => price - plan.entry_price,
        Direction::Short => plan.entry_price - price,
    };
    let pnl_r = if plan.risk_points > 0.0 {
        pnl_points / plan.risk_points
    } else {
        0.0
    };
    ExitEvent {
        time,
        price,
        reason,
        pnl_points,
        pnl_r,
        win: pnl_points > 0.0,
    }
}

/// Check one bar against the plan. Stop is checked before target: when
/// a single bar spans both, the conservative reading loses.
pub fn check_exit(plan: &TradePlan, bar: &Bar) -> Option<ExitEvent> {
    match plan.direction {
        Direction::Long => {
            if bar.low <= plan.stop_loss {
                return Some(exit_event(plan, bar.timestamp, plan.stop_loss, ExitReason::Stop));
            }
            if bar.high >= plan.target {
                return Some(exit_event(plan, bar.timestamp, plan.target, ExitReason::Target));
            }
        }
        Direction::Short => {
            if bar.high >= plan.stop_loss {
                return Some(exit_event(plan, bar.timestamp, plan.stop_loss, ExitReason::Stop));
            }
            if bar.low <= plan.target {
                return Some(exit_event(plan, bar.timestamp, plan.target, ExitReason::Target));
            }
        }
    }
    None
}

/// Flatten at a bar's close (end of the trading window)
pub fn close_at_session_end(plan: &TradePlan, bar: &Bar) -> ExitEvent {
    exit_event(plan, bar.timestamp, bar.close, ExitReason::SessionClose)
}

/// Walk `bars` in order and return the first exit; flattens on the last
/// bar's close when neither stop nor target is touched.
///
/// Returns `None` only for an empty series.
pub fn simulate(plan: &TradePlan, bars: &[Bar]) -> Option<ExitEvent> {
    for bar in bars {
        if let Some(event) = check_exit(plan, bar) {
            return Some(event);
        }
    }
    bars.last().map(|bar| close_at_session_end(plan, bar))
}
