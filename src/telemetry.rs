//! Record sinks
//!
//! The engine emits three record streams: completed trades (real and
//! shadow), accepted state transitions, and no-trade sessions with
//! their reasons. `RecordSink` decouples the decision core from where
//! those rows land; the CSV sink is what the replay binary uses.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::session::TransitionRecord;
use crate::shadow::TradeRecord;

/// Destination for the engine's record streams
pub trait RecordSink {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<()>;
    fn record_transition(&mut self, date: NaiveDate, record: &TransitionRecord) -> Result<()>;
    fn record_no_trade(&mut self, date: NaiveDate, state: &str, reason: &str) -> Result<()>;
}

/// Discards everything. Used in tests and library-only embedding.
pub struct NullSink;

impl RecordSink for NullSink {
    fn record_trade(&mut self, _record: &TradeRecord) -> Result<()> {
        Ok(())
    }

    fn record_transition(&mut self, _date: NaiveDate, _record: &TransitionRecord) -> Result<()> {
        Ok(())
    }

    fn record_no_trade(&mut self, _date: NaiveDate, _state: &str, _reason: &str) -> Result<()> {
        Ok(())
    }
}

// Flat row shapes; nested structs and enum payloads do not survive the
// csv serializer.

#[derive(Serialize)]
struct TradeRow<'a> {
    id: String,
    kind: String,
    session_date: NaiveDate,
    symbol: &'a str,
    direction: String,
    entry_time: String,
    entry_price: f64,
    stop_loss: f64,
    target: f64,
    exit_time: String,
    exit_price: f64,
    exit_reason: String,
    pnl_points: f64,
    pnl_r: f64,
    win: bool,
    blocking_gate: String,
    gates_passed: String,
    gates_failed: String,
    anchor_price: f64,
    adr: f64,
    overnight_ratio: f64,
    displacement_score: f64,
    divergence_degree: f64,
    primary_sweep_depth_norm: f64,
    reference_sweep_depth_norm: f64,
}

#[derive(Serialize)]
struct TransitionRow {
    session_date: NaiveDate,
    timestamp: String,
    from: String,
    to: String,
    reason: String,
    context: String,
}

#[derive(Serialize)]
struct NoTradeRow<'a> {
    session_date: NaiveDate,
    final_state: &'a str,
    reason: &'a str,
}

/// Writes each stream to its own CSV file under an output directory
pub struct CsvSink {
    trades: Writer<File>,
    transitions: Writer<File>,
    no_trades: Writer<File>,
}

impl CsvSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output dir {}", dir.display()))?;
        let open = |name: &str| -> Result<Writer<File>> {
            let path = dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            Ok(Writer::from_writer(file))
        };
        Ok(Self {
            trades: open("trades.csv")?,
            transitions: open("transitions.csv")?,
            no_trades: open("no_trades.csv")?,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.trades.flush().context("flushing trades.csv")?;
        self.transitions.flush().context("flushing transitions.csv")?;
        self.no_trades.flush().context("flushing no_trades.csv")?;
        Ok(())
    }
}

fn join_gates(gates: &[crate::gates::GateName]) -> String {
    gates
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RecordSink for CsvSink {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<()> {
        self.trades
            .serialize(TradeRow {
                id: record.id.to_string(),
                kind: record.kind.to_string(),
                session_date: record.session_date,
                symbol: &record.symbol,
                direction: record.direction.to_string(),
                entry_time: record.entry_time.to_rfc3339(),
                entry_price: record.entry_price,
                stop_loss: record.stop_loss,
                target: record.target,
                exit_time: record.exit_time.to_rfc3339(),
                exit_price: record.exit_price,
                exit_reason: record.exit_reason.to_string(),
                pnl_points: record.pnl_points,
                pnl_r: record.pnl_r,
                win: record.win,
                blocking_gate: record
                    .blocking_gate
                    .map(|g| g.to_string())
                    .unwrap_or_default(),
                gates_passed: join_gates(&record.gates_passed),
                gates_failed: join_gates(&record.gates_failed),
                anchor_price: record.anchor_price,
                adr: record.adr,
                overnight_ratio: record.overnight_ratio,
                displacement_score: record.displacement_score,
                divergence_degree: record.divergence_degree,
                primary_sweep_depth_norm: record.primary_sweep_depth_norm,
                reference_sweep_depth_norm: record.reference_sweep_depth_norm,
            })
            .context("writing trade row")
    }

    fn record_transition(&mut self, date: NaiveDate, record: &TransitionRecord) -> Result<()> {
        self.transitions
            .serialize(TransitionRow {
                session_date: date,
                timestamp: record.timestamp.to_rfc3339(),
                from: record.from.to_string(),
                to: record.to.to_string(),
                reason: record.reason.clone(),
                context: record
                    .context
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            })
            .context("writing transition row")
    }

    fn record_no_trade(&mut self, date: NaiveDate, state: &str, reason: &str) -> Result<()> {
        self.no_trades
            .serialize(NoTradeRow {
                session_date: date,
                final_state: state,
                reason,
            })
            .context("writing no-trade row")
    }
}
