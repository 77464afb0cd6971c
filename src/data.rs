//! Bar data loading
//!
//! Replay input is per-instrument CSV with UTC timestamps. Loading
//! validates ordering up front so the rest of the crate can assume an
//! ordered, duplicate-free series and use binary-search slicing.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::bars::{eastern_date, Bar};

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Load an ordered bar series for one instrument from CSV.
///
/// Expected header: `timestamp,open,high,low,close,volume` with RFC 3339
/// timestamps. Rejects out-of-order and duplicate timestamps.
pub fn load_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening bar file {}", path.display()))?;

    let mut bars: Vec<Bar> = Vec::new();
    for (i, row) in reader.deserialize::<BarRow>().enumerate() {
        let row = row.with_context(|| format!("row {} of {}", i + 1, path.display()))?;
        if let Some(prev) = bars.last() {
            if row.timestamp <= prev.timestamp {
                bail!(
                    "{}: bar at row {} not strictly after previous ({} <= {})",
                    path.display(),
                    i + 1,
                    row.timestamp,
                    prev.timestamp
                );
            }
        }
        bars.push(Bar {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            symbol: symbol.to_string(),
        });
    }

    if bars.is_empty() {
        bail!("{}: no bars", path.display());
    }

    info!(
        symbol,
        bars = bars.len(),
        first = %bars[0].timestamp,
        last = %bars[bars.len() - 1].timestamp,
        "loaded bar series"
    );
    Ok(bars)
}

/// Distinct ET calendar dates present in both series, in order.
///
/// These are the candidate session dates for a replay; sessions without
/// enough history fail later with a typed signal error.
pub fn session_dates(primary: &[Bar], reference: &[Bar]) -> Vec<NaiveDate> {
    let primary_dates: BTreeSet<NaiveDate> =
        primary.iter().map(|b| eastern_date(b.timestamp)).collect();
    let reference_dates: BTreeSet<NaiveDate> =
        reference.iter().map(|b| eastern_date(b.timestamp)).collect();
    primary_dates.intersection(&reference_dates).copied().collect()
}
