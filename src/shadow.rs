//! Shadow trades: classification and the review-locked ledger
//!
//! A shadow trade is a rejected setup that failed exactly one gating
//! filter while every structural gate passed: a clean near miss whose
//! virtual outcome tells us what that one filter cost. Compound
//! failures are discarded from attribution on purpose; mixing them in
//! would blur the single-filter comparison. The ledger refuses every
//! analysis call until enough real trades exist, unconditionally.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::error::AnalysisLocked;
use crate::exits::{Direction, ExitReason};
use crate::gates::{GateName, GateResult};

/// Outcome of classifying a gate batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Every core and gating gate passed; take the trade
    Real,
    /// All core passed, exactly one gating filter failed
    Shadow { blocking_gate: GateName },
    /// Anything else: structurally broken or a compound violation
    Uncategorized { reason: String },
}

/// Partition a full gate batch into a classification.
///
/// The batch must come from a single snapshot evaluation; it is read,
/// never mutated.
pub fn classify(batch: &[GateResult]) -> Classification {
    let core_failed: Vec<&GateResult> =
        batch.iter().filter(|g| g.name.is_core() && !g.passed).collect();

    if !core_failed.is_empty() {
        return Classification::Uncategorized {
            reason: format!(
                "core gate failed: {}",
                core_failed
                    .iter()
                    .map(|g| g.name.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
    }

    let gating_failed: Vec<&GateResult> =
        batch.iter().filter(|g| g.name.is_gating() && !g.passed).collect();

    match gating_failed.as_slice() {
        [] => Classification::Real,
        [only] => Classification::Shadow {
            blocking_gate: only.name,
        },
        many => Classification::Uncategorized {
            reason: format!("{} gating filters failed", many.len()),
        },
    }
}

/// REAL or SHADOW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Real,
    Shadow,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Real => write!(f, "REAL"),
            TradeKind::Shadow => write!(f, "SHADOW"),
        }
    }
}

/// One completed session outcome, real or virtual. Immutable after
/// creation; a session produces at most one REAL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub kind: TradeKind,
    pub session_date: NaiveDate,
    pub symbol: String,
    pub direction: Direction,

    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl_points: f64,
    pub pnl_r: f64,
    pub win: bool,

    /// Which single gate blocked entry (shadow records only)
    pub blocking_gate: Option<GateName>,
    pub gates_passed: Vec<GateName>,
    pub gates_failed: Vec<GateName>,

    // Signal context at decision time
    pub anchor_price: f64,
    pub adr: f64,
    pub overnight_ratio: f64,
    pub displacement_score: f64,
    pub divergence_degree: f64,
    pub primary_sweep_depth_norm: f64,
    pub reference_sweep_depth_norm: f64,
}

/// Per-gate shadow performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePerformance {
    pub count: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub avg_r: f64,
    pub total_r: f64,
    pub best_r: f64,
    pub worst_r: f64,
}

/// Aggregate stats over one cohort of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub count: usize,
    pub win_rate: f64,
    pub avg_r: f64,
    pub total_r: f64,
}

fn cohort_stats<'a>(records: impl Iterator<Item = &'a TradeRecord>) -> CohortStats {
    let mut count = 0usize;
    let mut wins = 0usize;
    let mut total_r = 0.0;
    for record in records {
        count += 1;
        if record.win {
            wins += 1;
        }
        total_r += record.pnl_r;
    }
    CohortStats {
        count,
        win_rate: if count > 0 { wins as f64 / count as f64 } else { 0.0 },
        avg_r: if count > 0 { total_r / count as f64 } else { 0.0 },
        total_r,
    }
}

/// Real-vs-shadow comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerComparison {
    pub real: CohortStats,
    pub shadow: CohortStats,
}

/// Append-only store of real and shadow outcomes.
///
/// Writers append one fully-built record per completed session; readers
/// only see records that are already complete. Every analysis entry
/// point enforces the review lock.
pub struct ShadowTradeLedger {
    records: Vec<TradeRecord>,
    review_threshold: usize,
}

impl ShadowTradeLedger {
    pub fn new(review_threshold: usize) -> Self {
        Self {
            records: Vec::new(),
            review_threshold,
        }
    }

    /// Append a completed record
    pub fn append(&mut self, record: TradeRecord) {
        info!(
            kind = %record.kind,
            date = %record.session_date,
            pnl_r = record.pnl_r,
            blocking_gate = ?record.blocking_gate,
            "ledger append"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn real_count(&self) -> usize {
        self.records.iter().filter(|r| r.kind == TradeKind::Real).count()
    }

    pub fn shadow_count(&self) -> usize {
        self.records.iter().filter(|r| r.kind == TradeKind::Shadow).count()
    }

    /// The hard guardrail. No override path exists.
    fn ensure_unlocked(&self) -> Result<(), AnalysisLocked> {
        let real_trades = self.real_count();
        if real_trades < self.review_threshold {
            return Err(AnalysisLocked {
                real_trades,
                required: self.review_threshold,
            });
        }
        Ok(())
    }

    fn shadows(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter(|r| r.kind == TradeKind::Shadow)
    }

    /// Shadow performance grouped by the gate that blocked entry
    pub fn analyze_by_gate(
        &self,
    ) -> Result<BTreeMap<GateName, GatePerformance>, AnalysisLocked> {
        self.ensure_unlocked()?;

        let mut grouped: BTreeMap<GateName, Vec<&TradeRecord>> = BTreeMap::new();
        for record in self.shadows() {
            if let Some(gate) = record.blocking_gate {
                grouped.entry(gate).or_default().push(record);
            }
        }

        let mut out = BTreeMap::new();
        for (gate, records) in grouped {
            let count = records.len();
            let wins = records.iter().filter(|r| r.win).count();
            let total_r: f64 = records.iter().map(|r| r.pnl_r).sum();
            let best_r = records.iter().map(|r| r.pnl_r).fold(f64::MIN, f64::max);
            let worst_r = records.iter().map(|r| r.pnl_r).fold(f64::MAX, f64::min);
            out.insert(
                gate,
                GatePerformance {
                    count,
                    wins,
                    win_rate: wins as f64 / count as f64,
                    avg_r: total_r / count as f64,
                    total_r,
                    best_r,
                    worst_r,
                },
            );
        }
        Ok(out)
    }

    /// Aggregate real records next to aggregate shadow records
    pub fn compare_real_vs_shadow(&self) -> Result<LedgerComparison, AnalysisLocked> {
        self.ensure_unlocked()?;
        Ok(LedgerComparison {
            real: cohort_stats(self.records.iter().filter(|r| r.kind == TradeKind::Real)),
            shadow: cohort_stats(self.shadows()),
        })
    }

    /// Net R each gate withheld by blocking its shadow trades.
    ///
    /// Positive means the filter blocked winners on balance.
    pub fn gate_opportunity_cost(&self) -> Result<BTreeMap<GateName, f64>, AnalysisLocked> {
        self.ensure_unlocked()?;

        let mut costs: BTreeMap<GateName, f64> = BTreeMap::new();
        for record in self.shadows() {
            if let Some(gate) = record.blocking_gate {
                *costs.entry(gate).or_insert(0.0) += record.pnl_r;
            }
        }
        Ok(costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::GateResult;
    use chrono::TimeZone;

    fn batch(failed: &[GateName]) -> Vec<GateResult> {
        GateName::ALL
            .iter()
            .map(|&name| {
                if failed.contains(&name) {
                    GateResult::fail(name, None, "test failure")
                } else {
                    GateResult::pass(name)
                }
            })
            .collect()
    }

    #[test]
    fn all_passing_is_real() {
        assert_eq!(classify(&batch(&[])), Classification::Real);
    }

    #[test]
    fn one_gating_failure_is_shadow_naming_the_gate() {
        let result = classify(&batch(&[GateName::DivergenceConfirmation]));
        assert_eq!(
            result,
            Classification::Shadow {
                blocking_gate: GateName::DivergenceConfirmation
            }
        );
    }

    #[test]
    fn two_gating_failures_are_uncategorized() {
        let result = classify(&batch(&[
            GateName::DivergenceConfirmation,
            GateName::ReclaimBody,
        ]));
        assert!(matches!(result, Classification::Uncategorized { .. }));
    }

    #[test]
    fn any_core_failure_is_uncategorized_regardless_of_gating() {
        // Core fail with clean gating
        let result = classify(&batch(&[GateName::SweepDetected]));
        assert!(matches!(result, Classification::Uncategorized { .. }));

        // Core fail plus exactly one gating fail: still not a shadow
        let result = classify(&batch(&[
            GateName::ReclaimDetected,
            GateName::DivergenceConfirmation,
        ]));
        assert!(matches!(result, Classification::Uncategorized { .. }));
    }

    fn record(kind: TradeKind, pnl_r: f64, blocking_gate: Option<GateName>) -> TradeRecord {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 15, 0, 0).unwrap();
        TradeRecord {
            id: Uuid::new_v4(),
            kind,
            session_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            symbol: "NQ".to_string(),
            direction: Direction::Long,
            entry_time: ts,
            entry_price: 21005.0,
            stop_loss: 20978.0,
            target: 21032.0,
            exit_time: ts,
            exit_price: 21005.0 + pnl_r * 27.0,
            exit_reason: if pnl_r > 0.0 { ExitReason::Target } else { ExitReason::Stop },
            pnl_points: pnl_r * 27.0,
            pnl_r,
            win: pnl_r > 0.0,
            blocking_gate,
            gates_passed: vec![],
            gates_failed: blocking_gate.into_iter().collect(),
            anchor_price: 21010.0,
            adr: 180.25,
            overnight_ratio: 0.5298,
            displacement_score: 1.45,
            divergence_degree: 0.45,
            primary_sweep_depth_norm: 0.8,
            reference_sweep_depth_norm: 0.0,
        }
    }

    fn ledger_with(real: usize, threshold: usize) -> ShadowTradeLedger {
        let mut ledger = ShadowTradeLedger::new(threshold);
        for i in 0..real {
            let r = if i % 2 == 0 { 1.0 } else { -1.0 };
            ledger.append(record(TradeKind::Real, r, None));
        }
        ledger
    }

    #[test]
    fn analysis_is_locked_below_threshold() {
        let mut ledger = ledger_with(49, 50);
        ledger.append(record(
            TradeKind::Shadow,
            1.0,
            Some(GateName::DivergenceConfirmation),
        ));

        let err = ledger.analyze_by_gate().unwrap_err();
        assert_eq!(err, AnalysisLocked { real_trades: 49, required: 50 });
        assert!(ledger.compare_real_vs_shadow().is_err());
        assert!(ledger.gate_opportunity_cost().is_err());
    }

    #[test]
    fn analysis_unlocks_exactly_at_threshold() {
        let mut ledger = ledger_with(50, 50);
        ledger.append(record(
            TradeKind::Shadow,
            1.0,
            Some(GateName::DivergenceConfirmation),
        ));
        assert!(ledger.analyze_by_gate().is_ok());
        assert!(ledger.compare_real_vs_shadow().is_ok());
    }

    #[test]
    fn shadow_records_do_not_advance_the_lock() {
        let mut ledger = ShadowTradeLedger::new(2);
        for _ in 0..10 {
            ledger.append(record(TradeKind::Shadow, 1.0, Some(GateName::ReclaimTiming)));
        }
        assert_eq!(ledger.real_count(), 0);
        assert!(ledger.analyze_by_gate().is_err());
    }

    #[test]
    fn per_gate_analysis_groups_by_blocking_gate() {
        let mut ledger = ledger_with(50, 50);
        ledger.append(record(TradeKind::Shadow, 2.0, Some(GateName::DivergenceConfirmation)));
        ledger.append(record(TradeKind::Shadow, -1.0, Some(GateName::DivergenceConfirmation)));
        ledger.append(record(TradeKind::Shadow, 1.0, Some(GateName::ReclaimTiming)));

        let by_gate = ledger.analyze_by_gate().unwrap();
        let smt = &by_gate[&GateName::DivergenceConfirmation];
        assert_eq!(smt.count, 2);
        assert_eq!(smt.wins, 1);
        assert!((smt.total_r - 1.0).abs() < 1e-9);
        assert!((smt.best_r - 2.0).abs() < 1e-9);
        assert!((smt.worst_r + 1.0).abs() < 1e-9);

        let costs = ledger.gate_opportunity_cost().unwrap();
        assert!((costs[&GateName::DivergenceConfirmation] - 1.0).abs() < 1e-9);
        assert!((costs[&GateName::ReclaimTiming] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn comparison_separates_cohorts() {
        let mut ledger = ledger_with(50, 50);
        ledger.append(record(TradeKind::Shadow, 2.0, Some(GateName::ReclaimBody)));

        let cmp = ledger.compare_real_vs_shadow().unwrap();
        assert_eq!(cmp.real.count, 50);
        assert_eq!(cmp.shadow.count, 1);
        assert!((cmp.real.win_rate - 0.5).abs() < 1e-9);
        assert!((cmp.shadow.total_r - 2.0).abs() < 1e-9);
    }
}
