use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smt_fade::data::{load_bars, session_dates};
use smt_fade::{CsvSink, StrategyConfig, StrategyEngine, TradeKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay the midnight-open fade over historical bars")]
struct Args {
    /// Primary instrument bar CSV (timestamp,open,high,low,close,volume)
    #[arg(long)]
    primary: PathBuf,

    /// Reference instrument bar CSV, same shape
    #[arg(long)]
    reference: PathBuf,

    /// JSON strategy config; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for trade/transition/no-trade CSVs
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => StrategyConfig::from_json_file(path)?,
        None => StrategyConfig::default(),
    };
    config.validate()?;

    let primary = load_bars(&args.primary, &config.primary_symbol)?;
    let reference = load_bars(&args.reference, &config.reference_symbol)?;
    let dates = session_dates(&primary, &reference);
    info!(sessions = dates.len(), "replay starting");

    let mut sink = CsvSink::create(&args.out)
        .with_context(|| format!("preparing output dir {}", args.out.display()))?;
    let mut engine = StrategyEngine::new(config);

    let mut real = 0usize;
    let mut shadow = 0usize;
    let mut no_trade = 0usize;
    for date in dates {
        let outcome = engine
            .run_session(&primary, &reference, date, &mut sink)
            .with_context(|| format!("session {date}"))?;
        match &outcome.record {
            Some(record) if record.kind == TradeKind::Real => real += 1,
            Some(_) => shadow += 1,
            None => no_trade += 1,
        }
    }
    sink.flush()?;
    info!(real, shadow, no_trade, "replay finished");

    match engine.ledger().analyze_by_gate() {
        Ok(by_gate) => {
            for (gate, perf) in &by_gate {
                info!(
                    gate = %gate,
                    count = perf.count,
                    win_rate = perf.win_rate,
                    avg_r = perf.avg_r,
                    total_r = perf.total_r,
                    "shadow performance"
                );
            }
            let comparison = engine.ledger().compare_real_vs_shadow()?;
            info!(
                real_win_rate = comparison.real.win_rate,
                real_total_r = comparison.real.total_r,
                shadow_win_rate = comparison.shadow.win_rate,
                shadow_total_r = comparison.shadow.total_r,
                "real vs shadow"
            );
            for (gate, cost) in engine.ledger().gate_opportunity_cost()? {
                info!(gate = %gate, withheld_r = cost, "opportunity cost");
            }
        }
        Err(locked) => warn!(%locked, "shadow review still locked"),
    }

    Ok(())
}
