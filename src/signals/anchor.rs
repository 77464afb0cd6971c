//! Anchor price (midnight open)
//!
//! The anchor is the open of the bar stamped exactly at 00:00 ET. It is
//! the reference every later signal measures against, so a missing
//! midnight bar is a hard `DataGap` rather than a silent substitution
//! of the nearest prior bar.

use chrono::NaiveDate;

use crate::bars::{anchor_instant, Bar};
use crate::error::SignalError;

/// Open price of the bar at exactly 00:00 ET on `date`.
///
/// `bars` must be ordered by timestamp; the lookup is a binary search.
pub fn anchor_price(bars: &[Bar], symbol: &str, date: NaiveDate) -> Result<f64, SignalError> {
    let instant = anchor_instant(date);
    let idx = bars.partition_point(|b| b.timestamp < instant);

    match bars.get(idx) {
        Some(bar) if bar.timestamp == instant => Ok(bar.open),
        _ => Err(SignalError::DataGap {
            symbol: symbol.to_string(),
            instant,
            what: "anchor bar (midnight open)".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar_at(ts: chrono::DateTime<Utc>, open: f64) -> Bar {
        Bar {
            timestamp: ts,
            open,
            high: open + 1.0,
            low: open - 1.0,
            close: open,
            volume: 100,
            symbol: "NQ".to_string(),
        }
    }

    #[test]
    fn finds_exact_midnight_bar() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let midnight = anchor_instant(date);
        let bars = vec![
            bar_at(midnight - Duration::minutes(1), 21000.0),
            bar_at(midnight, 21010.5),
            bar_at(midnight + Duration::minutes(1), 21020.0),
        ];
        assert_eq!(anchor_price(&bars, "NQ", date).unwrap(), 21010.5);
    }

    #[test]
    fn missing_midnight_bar_is_a_data_gap() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let midnight = anchor_instant(date);
        // Gap around midnight: nearby bars must not be substituted
        let bars = vec![
            bar_at(midnight - Duration::minutes(2), 21000.0),
            bar_at(midnight + Duration::minutes(3), 21020.0),
        ];
        let err = anchor_price(&bars, "NQ", date).unwrap_err();
        match err {
            SignalError::DataGap { symbol, instant, .. } => {
                assert_eq!(symbol, "NQ");
                assert_eq!(instant, midnight);
            }
            other => panic!("expected DataGap, got {other:?}"),
        }
    }

    #[test]
    fn empty_series_is_a_data_gap() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert!(anchor_price(&[], "NQ", date).is_err());
    }

    #[test]
    fn deterministic_across_repeat_calls() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let midnight = anchor_instant(date);
        let bars = vec![bar_at(midnight, 21010.5)];
        let a = anchor_price(&bars, "NQ", date).unwrap();
        let b = anchor_price(&bars, "NQ", date).unwrap();
        assert_eq!(a, b);
    }
}
