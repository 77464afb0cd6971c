//! Range normalization
//!
//! ADR (average daily range) over trailing complete days, and the
//! overnight-range ratio filter built on top of it. A tight overnight
//! means the market has not moved enough to sweep anything meaningful;
//! a wide one means the move is already spent. Either way the session
//! is skipped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::bars::{anchor_instant, bars_between, eastern_date, prev_session_close_instant, Bar};
use crate::error::SignalError;

/// High/low extent of one ET calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRange {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
}

impl DailyRange {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Collapse an ordered bar series into per-ET-date ranges
pub fn daily_ranges(bars: &[Bar]) -> Vec<DailyRange> {
    let mut days: Vec<DailyRange> = Vec::new();

    for bar in bars {
        let date = eastern_date(bar.timestamp);
        match days.last_mut() {
            Some(last) if last.date == date => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
            }
            _ => days.push(DailyRange {
                date,
                high: bar.high,
                low: bar.low,
            }),
        }
    }

    days
}

/// Mean daily range over the trailing `lookback` complete days.
///
/// Days on or after `as_of` are excluded; the in-progress day never
/// contributes to its own normalizer.
pub fn range_normalizer(
    days: &[DailyRange],
    as_of: NaiveDate,
    lookback: usize,
) -> Result<f64, SignalError> {
    let complete: Vec<&DailyRange> = days.iter().filter(|d| d.date < as_of).collect();

    if complete.len() < lookback {
        return Err(SignalError::InsufficientHistory {
            needed: lookback,
            available: complete.len(),
        });
    }

    let tail = &complete[complete.len() - lookback..];
    let sum: f64 = tail.iter().map(|d| d.range()).sum();
    Ok(sum / lookback as f64)
}

/// Outcome of the overnight-range filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvernightRangeCheck {
    pub high: f64,
    pub low: f64,
    pub range: f64,
    pub normalizer: f64,
    /// Overnight range divided by the normalizer
    pub ratio: f64,
    pub valid: bool,
    /// Names the violated bound when invalid
    pub reason: Option<String>,
}

/// Overnight range (prior 16:00 ET close through the 00:00 ET anchor)
/// as a fraction of the normalizer, validated against `[min, max]`.
pub fn overnight_range_ratio(
    bars: &[Bar],
    symbol: &str,
    date: NaiveDate,
    normalizer: f64,
    min_ratio: f64,
    max_ratio: f64,
) -> Result<OvernightRangeCheck, SignalError> {
    let start = prev_session_close_instant(date);
    let end = anchor_instant(date);
    let overnight = bars_between(bars, start, end);

    if overnight.is_empty() {
        return Err(SignalError::DataGap {
            symbol: symbol.to_string(),
            instant: start,
            what: format!("overnight session through {end}"),
        });
    }

    let high = overnight.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = overnight.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = high - low;
    let ratio = range / normalizer;

    let valid = ratio >= min_ratio && ratio <= max_ratio;
    let reason = if valid {
        None
    } else if ratio < min_ratio {
        Some(format!(
            "overnight range too tight: {:.2}% < {:.2}%",
            ratio * 100.0,
            min_ratio * 100.0
        ))
    } else {
        Some(format!(
            "overnight range too wide: {:.2}% > {:.2}%",
            ratio * 100.0,
            max_ratio * 100.0
        ))
    };

    Ok(OvernightRangeCheck {
        high,
        low,
        range,
        normalizer,
        ratio,
        valid,
        reason,
    })
}
