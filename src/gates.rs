//! Admission gates
//!
//! Named boolean preconditions evaluated once per admission decision,
//! all against the same signal snapshot. Core gates are structural
//! preconditions (the setup physically happened); gating gates are
//! decision filters (the setup was good enough). The split drives
//! shadow-trade attribution: a near miss is all core passing with
//! exactly one gating failure.

use serde::{Deserialize, Serialize};

use crate::signals::{DisplacementBand, DisplacementResult, DivergenceResult, OvernightRangeCheck};

/// The closed set of admission gates, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GateName {
    // Core (structural) gates
    TimeWindow,
    OvernightRange,
    SweepDetected,
    ReclaimDetected,
    // Gating (decision) filters
    DivergenceConfirmation,
    DisplacementStrength,
    ReclaimTiming,
    ReclaimBody,
}

impl GateName {
    pub const ALL: [GateName; 8] = [
        GateName::TimeWindow,
        GateName::OvernightRange,
        GateName::SweepDetected,
        GateName::ReclaimDetected,
        GateName::DivergenceConfirmation,
        GateName::DisplacementStrength,
        GateName::ReclaimTiming,
        GateName::ReclaimBody,
    ];

    /// Structural precondition rather than a decision filter
    pub fn is_core(self) -> bool {
        matches!(
            self,
            GateName::TimeWindow
                | GateName::OvernightRange
                | GateName::SweepDetected
                | GateName::ReclaimDetected
        )
    }

    pub fn is_gating(self) -> bool {
        !self.is_core()
    }
}

impl std::fmt::Display for GateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateName::TimeWindow => write!(f, "time window"),
            GateName::OvernightRange => write!(f, "overnight range"),
            GateName::SweepDetected => write!(f, "sweep detected"),
            GateName::ReclaimDetected => write!(f, "reclaim detected"),
            GateName::DivergenceConfirmation => write!(f, "divergence confirmation"),
            GateName::DisplacementStrength => write!(f, "displacement strength"),
            GateName::ReclaimTiming => write!(f, "reclaim timing"),
            GateName::ReclaimBody => write!(f, "reclaim body"),
        }
    }
}

/// Verdict for a single gate; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: GateName,
    pub passed: bool,
    /// Signed distance to the pass/fail boundary, when meaningful
    pub margin: Option<f64>,
    pub reason: Option<String>,
}

impl GateResult {
    pub fn pass(name: GateName) -> Self {
        Self {
            name,
            passed: true,
            margin: None,
            reason: None,
        }
    }

    pub fn pass_with_margin(name: GateName, margin: f64) -> Self {
        Self {
            name,
            passed: true,
            margin: Some(margin),
            reason: None,
        }
    }

    pub fn fail(name: GateName, margin: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            margin,
            reason: Some(reason.into()),
        }
    }
}

/// Reclaim observation at decision time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclaimCheck {
    /// A close back through the anchor in the bias direction printed
    pub detected: bool,
    /// Body/range ratio of the reclaim candle
    pub body_ratio: f64,
    /// Minutes from the sweep extreme to the reclaim close
    pub minutes_since_sweep: f64,
}

/// Everything the evaluator needs, captured at one instant.
///
/// Built once per admission decision so no gate sees staler data than
/// another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupSnapshot {
    pub in_window: bool,
    pub overnight: OvernightRangeCheck,
    pub sweep_detected: bool,
    pub sweep_depth_norm: f64,
    pub reclaim: Option<ReclaimCheck>,
    pub displacement: DisplacementResult,
    pub divergence: DivergenceResult,
}

/// Evaluates the full ordered gate set against one snapshot
#[derive(Debug, Clone)]
pub struct FilterEvaluator {
    /// Reclaim must print within this many minutes of the sweep
    pub reclaim_timeout_minutes: f64,
    /// Minimum body/range ratio for the reclaim candle
    pub reclaim_min_body_ratio: f64,
}

impl FilterEvaluator {
    pub fn new(reclaim_timeout_minutes: f64, reclaim_min_body_ratio: f64) -> Self {
        Self {
            reclaim_timeout_minutes,
            reclaim_min_body_ratio,
        }
    }

    /// Produce the complete batch of gate verdicts for a snapshot.
    ///
    /// Always returns all eight gates in `GateName::ALL` order.
    pub fn evaluate(&self, snapshot: &SetupSnapshot) -> Vec<GateResult> {
        let mut results = Vec::with_capacity(GateName::ALL.len());

        results.push(if snapshot.in_window {
            GateResult::pass(GateName::TimeWindow)
        } else {
            GateResult::fail(GateName::TimeWindow, None, "outside trading window")
        });

        results.push(if snapshot.overnight.valid {
            // Margin: distance to the nearer bound
            GateResult::pass_with_margin(GateName::OvernightRange, snapshot.overnight.ratio)
        } else {
            GateResult::fail(
                GateName::OvernightRange,
                Some(snapshot.overnight.ratio),
                snapshot
                    .overnight
                    .reason
                    .clone()
                    .unwrap_or_else(|| "overnight range invalid".to_string()),
            )
        });

        results.push(if snapshot.sweep_detected {
            GateResult::pass_with_margin(GateName::SweepDetected, snapshot.sweep_depth_norm)
        } else {
            GateResult::fail(GateName::SweepDetected, None, "no qualifying sweep printed")
        });

        match &snapshot.reclaim {
            Some(reclaim) if reclaim.detected => {
                results.push(GateResult::pass(GateName::ReclaimDetected))
            }
            _ => results.push(GateResult::fail(
                GateName::ReclaimDetected,
                None,
                "no close back through the anchor",
            )),
        }

        results.push(if snapshot.divergence.diverged {
            // Degree recorded as margin for analysis; it never gates
            GateResult::pass_with_margin(
                GateName::DivergenceConfirmation,
                snapshot.divergence.degree,
            )
        } else {
            GateResult::fail(
                GateName::DivergenceConfirmation,
                Some(snapshot.divergence.degree),
                "reference instrument swept too (no divergence)",
            )
        });

        let displacement = &snapshot.displacement;
        results.push(if displacement.band != DisplacementBand::TooStrong {
            GateResult::pass_with_margin(GateName::DisplacementStrength, displacement.score)
        } else {
            GateResult::fail(
                GateName::DisplacementStrength,
                Some(displacement.score),
                format!("displacement {:.2} is {}", displacement.score, displacement.band),
            )
        });

        match &snapshot.reclaim {
            Some(reclaim) if reclaim.detected => {
                let slack = self.reclaim_timeout_minutes - reclaim.minutes_since_sweep;
                results.push(if slack >= 0.0 {
                    GateResult::pass_with_margin(GateName::ReclaimTiming, slack)
                } else {
                    GateResult::fail(
                        GateName::ReclaimTiming,
                        Some(slack),
                        format!(
                            "reclaim took {:.1} min (limit {:.1})",
                            reclaim.minutes_since_sweep, self.reclaim_timeout_minutes
                        ),
                    )
                });

                let body_margin = reclaim.body_ratio - self.reclaim_min_body_ratio;
                results.push(if body_margin >= 0.0 {
                    GateResult::pass_with_margin(GateName::ReclaimBody, body_margin)
                } else {
                    GateResult::fail(
                        GateName::ReclaimBody,
                        Some(body_margin),
                        format!(
                            "reclaim body {:.2} below minimum {:.2}",
                            reclaim.body_ratio, self.reclaim_min_body_ratio
                        ),
                    )
                });
            }
            _ => {
                // Without a reclaim the dependent filters cannot be judged;
                // they fail alongside the core gate.
                results.push(GateResult::fail(
                    GateName::ReclaimTiming,
                    None,
                    "no reclaim to time",
                ));
                results.push(GateResult::fail(
                    GateName::ReclaimBody,
                    None,
                    "no reclaim candle to measure",
                ));
            }
        }

        results
    }
}
