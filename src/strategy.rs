//! Session orchestration
//!
//! Runs one trading session end to end: signal prerequisites, the
//! overnight filter, sweep and reclaim detection, gate evaluation,
//! entry, and exit. A session that dies on a gating filter is not
//! discarded: scanning continues so the near-miss can be completed
//! against the same exit engine and attributed in the ledger.
//!
//! Preliminary signal reads at the sweep decide whether the session
//! stays live; the decision-time gate batch at the reclaim is what
//! classifies the outcome. Both run through the same signal functions.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bars::{
    bars_between, bars_up_to, in_trading_window, instant_at, minutes_between, Bar,
};
use crate::config::StrategyConfig;
use crate::exits::{build_plan, close_at_session_end, simulate, Direction, ExitEvent, TradePlan};
use crate::gates::{FilterEvaluator, ReclaimCheck, SetupSnapshot};
use crate::session::{SessionState, SessionStateMachine};
use crate::shadow::{classify, Classification, ShadowTradeLedger, TradeKind, TradeRecord};
use crate::signals::{DisplacementBand, SignalEngine, SweepDirection};
use crate::telemetry::RecordSink;

/// What one session produced
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub date: NaiveDate,
    pub final_state: SessionState,
    pub record: Option<TradeRecord>,
    pub no_trade_reason: Option<String>,
}

/// One-trade-per-day decision engine over two instruments
pub struct StrategyEngine {
    config: StrategyConfig,
    signals: SignalEngine,
    evaluator: FilterEvaluator,
    machine: SessionStateMachine,
    ledger: ShadowTradeLedger,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        let evaluator = FilterEvaluator::new(
            config.reclaim_timeout_minutes,
            config.reclaim_min_body_ratio,
        );
        let machine = SessionStateMachine::new(config.max_trades_per_session);
        let ledger = ShadowTradeLedger::new(config.review_lock_threshold);
        Self {
            signals: SignalEngine::new(config.clone()),
            config,
            evaluator,
            machine,
            ledger,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ShadowTradeLedger {
        &self.ledger
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Replay one session date over the two bar series.
    ///
    /// Both series must be ordered; `primary` carries the traded
    /// instrument and `reference` only feeds the divergence check.
    pub fn run_session(
        &mut self,
        primary: &[Bar],
        reference: &[Bar],
        date: NaiveDate,
        sink: &mut dyn RecordSink,
    ) -> Result<SessionOutcome> {
        self.machine.reset_for_new_session(date);
        self.signals.invalidate(date);
        let cfg = self.config.clone();

        let open = instant_at(date, cfg.window_start.0, cfg.window_start.1);
        let close = instant_at(date, cfg.window_end.0, cfg.window_end.1);

        // Signal prerequisites. A failure here abandons the session
        // before it activates; the day simply never traded.
        let primary_anchor = match self.signals.anchor_price(primary, &cfg.primary_symbol, date) {
            Ok(price) => price,
            Err(e) => return self.finish_no_trade(date, sink, format!("signal unavailable: {e}")),
        };
        let reference_anchor =
            match self.signals.anchor_price(reference, &cfg.reference_symbol, date) {
                Ok(price) => price,
                Err(e) => {
                    return self.finish_no_trade(date, sink, format!("signal unavailable: {e}"))
                }
            };
        let overnight = match self.signals.overnight_range_ratio(primary, &cfg.primary_symbol, date)
        {
            Ok(check) => check,
            Err(e) => return self.finish_no_trade(date, sink, format!("signal unavailable: {e}")),
        };

        let window = bars_between(primary, open, close);
        let Some(first) = window.first() else {
            return self.finish_no_trade(date, sink, "no bars in trading window".to_string());
        };

        self.machine.transition_to(
            SessionState::SessionActive,
            "trading window open",
            first.timestamp,
            None,
        )?;

        if !overnight.valid {
            let reason = overnight
                .reason
                .clone()
                .unwrap_or_else(|| "overnight range invalid".to_string());
            self.machine.transition_to(
                SessionState::OvernightRangeInvalid,
                reason.clone(),
                first.timestamp,
                Some(json!({ "ratio": overnight.ratio })),
            )?;
            return self.finish_no_trade(date, sink, reason);
        }
        self.machine.transition_to(
            SessionState::AwaitingDisplacement,
            "overnight range valid",
            first.timestamp,
            Some(json!({ "ratio": overnight.ratio })),
        )?;

        // A session opening below the anchor is already displaced
        // through it; the fade is long back up through the level.
        // Opening above (or flat on it) mirrors short.
        let (direction, sweep_direction) = if first.close < primary_anchor {
            (Direction::Long, SweepDirection::Below)
        } else {
            (Direction::Short, SweepDirection::Above)
        };
        info!(%date, %direction, anchor = primary_anchor, "session bias set");

        // Wait for the sweep to print
        let mut sweep_idx = None;
        let mut last_scanned = first.timestamp;
        for (i, bar) in window.iter().enumerate() {
            if minutes_between(open, bar.timestamp) > cfg.sweep_timeout_minutes {
                break;
            }
            last_scanned = bar.timestamp;
            let swept = match sweep_direction {
                SweepDirection::Below => bar.low < primary_anchor,
                SweepDirection::Above => bar.high > primary_anchor,
            };
            if swept {
                sweep_idx = Some(i);
                break;
            }
        }
        let Some(sweep_idx) = sweep_idx else {
            self.machine.transition_to(
                SessionState::SessionLocked,
                "no qualifying sweep printed",
                last_scanned,
                None,
            )?;
            return self.finish_no_trade(
                date,
                sink,
                "no qualifying sweep printed within timeout".to_string(),
            );
        };
        let sweep_bar = &window[sweep_idx];

        self.machine.transition_to(
            SessionState::AwaitingDivergenceConfirmation,
            "sweep printed",
            sweep_bar.timestamp,
            Some(json!({ "direction": direction.to_string() })),
        )?;

        // Preliminary reads at the sweep
        let sweep_leg = &window[..=sweep_idx];
        let sweep_unit = self
            .signals
            .volatility_unit(bars_up_to(primary, sweep_bar.timestamp));
        let prelim_displacement = self.signals.displacement_index(sweep_leg, sweep_unit);
        let prelim_divergence = self.signals.cross_instrument_divergence(
            bars_between(primary, open, sweep_bar.timestamp),
            bars_between(reference, open, sweep_bar.timestamp),
            primary_anchor,
            reference_anchor,
            sweep_direction,
        );

        let mut live = true;
        if prelim_displacement.band == DisplacementBand::TooStrong {
            self.machine.transition_to(
                SessionState::SessionLocked,
                format!("displacement {:.2} too strong to fade", prelim_displacement.score),
                sweep_bar.timestamp,
                Some(json!({ "score": prelim_displacement.score })),
            )?;
            live = false;
        } else if !prelim_divergence.diverged {
            self.machine.transition_to(
                SessionState::SessionLocked,
                "reference instrument swept too, no divergence",
                sweep_bar.timestamp,
                Some(json!({ "degree": prelim_divergence.degree })),
            )?;
            live = false;
        } else {
            self.machine.transition_to(
                SessionState::AwaitingReclaim,
                "divergence confirmed",
                sweep_bar.timestamp,
                Some(json!({ "degree": prelim_divergence.degree })),
            )?;
        }

        // Watch for the reclaim close back through the anchor. Scanning
        // continues after a lock so the near-miss can still be
        // completed and attributed.
        let mut reclaim_idx = None;
        for (i, bar) in window.iter().enumerate().skip(sweep_idx + 1) {
            let reclaimed = match direction {
                Direction::Long => bar.close > primary_anchor,
                Direction::Short => bar.close < primary_anchor,
            };
            if reclaimed {
                reclaim_idx = Some(i);
                break;
            }
        }

        // The deviation extreme is fixed at decision time over the
        // trailing lookback, never reaching behind the sweep itself.
        let decision_idx = reclaim_idx.unwrap_or(window.len() - 1);
        let scan_start = (decision_idx + 1)
            .saturating_sub(cfg.sweep_extreme_lookback)
            .max(sweep_idx);
        let scan = &window[scan_start..=decision_idx];
        let extreme_bar = match sweep_direction {
            SweepDirection::Below => scan
                .iter()
                .min_by(|a, b| a.low.partial_cmp(&b.low).unwrap_or(std::cmp::Ordering::Equal)),
            SweepDirection::Above => scan
                .iter()
                .max_by(|a, b| a.high.partial_cmp(&b.high).unwrap_or(std::cmp::Ordering::Equal)),
        }
        .unwrap_or(sweep_bar);
        let (extreme, extreme_time) = match sweep_direction {
            SweepDirection::Below => (extreme_bar.low, extreme_bar.timestamp),
            SweepDirection::Above => (extreme_bar.high, extreme_bar.timestamp),
        };

        let reclaim_check = reclaim_idx.map(|r| {
            let bar = &window[r];
            let body_ratio = if bar.range() > 0.0 {
                bar.body() / bar.range()
            } else {
                0.0
            };
            ReclaimCheck {
                detected: true,
                body_ratio,
                minutes_since_sweep: minutes_between(extreme_time, bar.timestamp),
            }
        });

        // Decision-time snapshot and batch
        let decision_ts = reclaim_idx.map(|r| window[r].timestamp).unwrap_or(close);
        let decision_unit = self.signals.volatility_unit(bars_up_to(primary, decision_ts));
        let displacement = self
            .signals
            .displacement_index(bars_between(primary, open, extreme_time), decision_unit);
        let divergence = self.signals.cross_instrument_divergence(
            bars_between(primary, open, decision_ts),
            bars_between(reference, open, decision_ts),
            primary_anchor,
            reference_anchor,
            sweep_direction,
        );

        let snapshot = SetupSnapshot {
            in_window: in_trading_window(decision_ts, cfg.window_start, cfg.window_end),
            overnight: overnight.clone(),
            sweep_detected: true,
            sweep_depth_norm: divergence.primary.depth_norm,
            reclaim: reclaim_check,
            displacement,
            divergence,
        };
        let batch = self.evaluator.evaluate(&snapshot);
        let classification = classify(&batch);

        let Some(reclaim_idx) = reclaim_idx else {
            if live {
                self.machine.transition_to(
                    SessionState::SessionLocked,
                    "no reclaim before window close",
                    decision_ts,
                    None,
                )?;
            }
            return self.finish_no_trade(date, sink, "no reclaim before window close".to_string());
        };
        let reclaim_bar = &window[reclaim_idx];

        // One plan and one exit path for real and virtual outcomes alike
        let plan = build_plan(
            direction,
            reclaim_bar.timestamp,
            reclaim_bar.close,
            extreme,
            cfg.stop_buffer_points,
            cfg.target_r_multiple,
        );
        let exit = simulate(&plan, &window[reclaim_idx + 1..])
            .unwrap_or_else(|| close_at_session_end(&plan, reclaim_bar));

        match classification {
            Classification::Real => {
                if !live {
                    // A preliminary read locked the session but the
                    // decision batch no longer confirms the failure.
                    return self.finish_no_trade(
                        date,
                        sink,
                        "locked before a tradeable reclaim".to_string(),
                    );
                }
                if let Err(block) = self.machine.can_enter_trade() {
                    let reason = format!("entry blocked: {block}");
                    self.machine.transition_to(
                        SessionState::SessionLocked,
                        reason.clone(),
                        reclaim_bar.timestamp,
                        None,
                    )?;
                    return self.finish_no_trade(date, sink, reason);
                }
                self.machine.transition_to(
                    SessionState::InTrade,
                    "anchor reclaimed",
                    reclaim_bar.timestamp,
                    Some(json!({
                        "entry": plan.entry_price,
                        "stop": plan.stop_loss,
                        "target": plan.target,
                    })),
                )?;
                self.machine.transition_to(
                    SessionState::SessionLocked,
                    format!("trade closed: {}", exit.reason),
                    exit.time,
                    None,
                )?;

                let record = self.build_record(
                    TradeKind::Real,
                    date,
                    direction,
                    &plan,
                    &exit,
                    None,
                    &batch,
                    primary_anchor,
                    &snapshot,
                );
                self.ledger.append(record.clone());
                sink.record_trade(&record)?;
                self.emit_trail(date, sink)?;
                Ok(SessionOutcome {
                    date,
                    final_state: self.machine.state(),
                    record: Some(record),
                    no_trade_reason: None,
                })
            }
            Classification::Shadow { blocking_gate } => {
                if live {
                    self.machine.transition_to(
                        SessionState::SessionLocked,
                        format!("setup rejected by {blocking_gate}"),
                        reclaim_bar.timestamp,
                        None,
                    )?;
                }
                let record = self.build_record(
                    TradeKind::Shadow,
                    date,
                    direction,
                    &plan,
                    &exit,
                    Some(blocking_gate),
                    &batch,
                    primary_anchor,
                    &snapshot,
                );
                self.ledger.append(record.clone());
                sink.record_trade(&record)?;
                self.emit_trail(date, sink)?;
                Ok(SessionOutcome {
                    date,
                    final_state: self.machine.state(),
                    record: Some(record),
                    no_trade_reason: None,
                })
            }
            Classification::Uncategorized { reason } => {
                if live {
                    self.machine.transition_to(
                        SessionState::SessionLocked,
                        reason.clone(),
                        reclaim_bar.timestamp,
                        None,
                    )?;
                }
                self.finish_no_trade(date, sink, format!("rejected setup not attributable: {reason}"))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        kind: TradeKind,
        date: NaiveDate,
        direction: Direction,
        plan: &TradePlan,
        exit: &ExitEvent,
        blocking_gate: Option<crate::gates::GateName>,
        batch: &[crate::gates::GateResult],
        anchor_price: f64,
        snapshot: &SetupSnapshot,
    ) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            kind,
            session_date: date,
            symbol: self.config.primary_symbol.clone(),
            direction,
            entry_time: plan.entry_time,
            entry_price: plan.entry_price,
            stop_loss: plan.stop_loss,
            target: plan.target,
            exit_time: exit.time,
            exit_price: exit.price,
            exit_reason: exit.reason,
            pnl_points: exit.pnl_points,
            pnl_r: exit.pnl_r,
            win: exit.win,
            blocking_gate,
            gates_passed: batch.iter().filter(|g| g.passed).map(|g| g.name).collect(),
            gates_failed: batch.iter().filter(|g| !g.passed).map(|g| g.name).collect(),
            anchor_price,
            adr: snapshot.overnight.normalizer,
            overnight_ratio: snapshot.overnight.ratio,
            displacement_score: snapshot.displacement.score,
            divergence_degree: snapshot.divergence.degree,
            primary_sweep_depth_norm: snapshot.divergence.primary.depth_norm,
            reference_sweep_depth_norm: snapshot.divergence.reference.depth_norm,
        }
    }

    fn emit_trail(&self, date: NaiveDate, sink: &mut dyn RecordSink) -> Result<()> {
        for record in self.machine.trail() {
            sink.record_transition(date, record)?;
        }
        Ok(())
    }

    fn finish_no_trade(
        &mut self,
        date: NaiveDate,
        sink: &mut dyn RecordSink,
        reason: String,
    ) -> Result<SessionOutcome> {
        warn!(%date, %reason, "session produced no record");
        self.emit_trail(date, sink)?;
        let state = self.machine.state();
        sink.record_no_trade(date, &state.to_string(), &reason)?;
        Ok(SessionOutcome {
            date,
            final_state: state,
            record: None,
            no_trade_reason: Some(reason),
        })
    }
}
