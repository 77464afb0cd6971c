//! Price bars and session-clock helpers
//!
//! All strategy logic runs on the America/New_York clock: the anchor
//! instant is 00:00 ET, the overnight session is the prior 16:00 ET
//! close through the anchor, and the trading window is a configured
//! morning slice. Bars themselves are stored in UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub symbol: String,
}

impl Bar {
    /// Candle body size in points
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low range in points
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Total upper + lower wick in points
    pub fn wicks(&self) -> f64 {
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        (self.high - body_high) + (body_low - self.low)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// 00:00 ET on the given date, as a UTC instant.
///
/// DST shifts happen at 02:00 local, so midnight always exists and is
/// unambiguous in America/New_York.
pub fn anchor_instant(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).expect("00:00 is a valid time");
    New_York
        .from_local_datetime(&midnight)
        .earliest()
        .expect("midnight exists in America/New_York")
        .with_timezone(&Utc)
}

/// 16:00 ET on the calendar day before `date`, as a UTC instant.
///
/// Start of the overnight session leading into `date`'s anchor.
pub fn prev_session_close_instant(date: NaiveDate) -> DateTime<Utc> {
    let prev = date - Duration::days(1);
    let close = prev.and_hms_opt(16, 0, 0).expect("16:00 is a valid time");
    New_York
        .from_local_datetime(&close)
        .earliest()
        .expect("16:00 exists in America/New_York")
        .with_timezone(&Utc)
}

/// ET calendar date a timestamp falls on
pub fn eastern_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&New_York).date_naive()
}

/// A clock time on `date` in ET, as a UTC instant
pub fn instant_at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let t = NaiveTime::from_hms_opt(hour, minute, 0).expect("valid wall-clock time");
    New_York
        .from_local_datetime(&date.and_time(t))
        .earliest()
        .expect("morning times exist in America/New_York")
        .with_timezone(&Utc)
}

/// Check whether a timestamp falls inside the [start, end] ET window
pub fn in_trading_window(
    ts: DateTime<Utc>,
    start: (u32, u32),
    end: (u32, u32),
) -> bool {
    let local = ts.with_timezone(&New_York);
    let minutes = local.hour() * 60 + local.minute();
    let lo = start.0 * 60 + start.1;
    let hi = end.0 * 60 + end.1;
    minutes >= lo && minutes <= hi
}

/// Minutes elapsed between two instants (negative when `b` < `a`)
pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_seconds() as f64 / 60.0
}

/// Slice of `bars` with timestamps in `[start, end]`.
///
/// Bars are ordered by timestamp, so this is two binary searches.
pub fn bars_between(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
    let lo = bars.partition_point(|b| b.timestamp < start);
    let hi = bars.partition_point(|b| b.timestamp <= end);
    &bars[lo..hi]
}

/// Bars up to and including `ts`
pub fn bars_up_to(bars: &[Bar], ts: DateTime<Utc>) -> &[Bar] {
    let hi = bars.partition_point(|b| b.timestamp <= ts);
    &bars[..hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: DateTime<Utc>) -> Bar {
        Bar {
            timestamp: ts,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10,
            symbol: "NQ".to_string(),
        }
    }

    #[test]
    fn anchor_instant_is_midnight_eastern() {
        // 2025-01-15 00:00 ET == 05:00 UTC (EST)
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let anchor = anchor_instant(date);
        assert_eq!(anchor, Utc.with_ymd_and_hms(2025, 1, 15, 5, 0, 0).unwrap());

        // 2025-07-15 00:00 ET == 04:00 UTC (EDT)
        let date = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let anchor = anchor_instant(date);
        assert_eq!(anchor, Utc.with_ymd_and_hms(2025, 7, 15, 4, 0, 0).unwrap());
    }

    #[test]
    fn overnight_session_starts_previous_afternoon() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let close = prev_session_close_instant(date);
        // 2025-01-14 16:00 ET == 21:00 UTC
        assert_eq!(close, Utc.with_ymd_and_hms(2025, 1, 14, 21, 0, 0).unwrap());
        assert!(close < anchor_instant(date));
    }

    #[test]
    fn trading_window_bounds_are_inclusive() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let open = instant_at(date, 9, 30);
        let close = instant_at(date, 10, 30);
        assert!(in_trading_window(open, (9, 30), (10, 30)));
        assert!(in_trading_window(close, (9, 30), (10, 30)));
        assert!(!in_trading_window(open - Duration::minutes(1), (9, 30), (10, 30)));
        assert!(!in_trading_window(close + Duration::minutes(1), (9, 30), (10, 30)));
    }

    #[test]
    fn bars_between_uses_inclusive_range() {
        let base = Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap();
        let bars: Vec<Bar> = (0..5)
            .map(|i| bar(base + Duration::minutes(i)))
            .collect();

        let slice = bars_between(&bars, base + Duration::minutes(1), base + Duration::minutes(3));
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].timestamp, base + Duration::minutes(1));

        let head = bars_up_to(&bars, base + Duration::minutes(2));
        assert_eq!(head.len(), 3);
    }

    #[test]
    fn wick_and_body_arithmetic() {
        let b = Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 106.0,
            volume: 1,
            symbol: "NQ".to_string(),
        };
        assert!((b.body() - 6.0).abs() < 1e-9);
        assert!((b.range() - 15.0).abs() < 1e-9);
        assert!((b.wicks() - 9.0).abs() < 1e-9);
        assert!(b.is_bullish());
    }
}
