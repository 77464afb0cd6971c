//! Displacement index
//!
//! Quantifies how strongly and consistently price moved through a
//! window, to judge whether the move is still fadeable or already a
//! one-way trend. Composite of candle conviction (body size against the
//! volatility unit), sustained direction (directionally-consistent bar
//! count) and an indecision penalty (wick share).

use serde::{Deserialize, Serialize};

use crate::bars::Bar;

/// Band assessment of a displacement score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplacementBand {
    /// Weak or grindy move, safe to fade
    Fadeable,
    /// Between thresholds, wait for clarity
    Ambiguous,
    /// Strong one-way displacement, do not fade
    TooStrong,
}

impl std::fmt::Display for DisplacementBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplacementBand::Fadeable => write!(f, "fadeable"),
            DisplacementBand::Ambiguous => write!(f, "ambiguous"),
            DisplacementBand::TooStrong => write!(f, "too-strong-to-fade"),
        }
    }
}

/// Displacement score with its component breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementResult {
    pub score: f64,
    pub band: DisplacementBand,
    /// Mean candle body in points
    pub avg_body_points: f64,
    /// Mean body/range ratio
    pub avg_body_ratio: f64,
    /// Bars whose body direction matches the window's net direction
    pub consistent_bars: usize,
    /// Mean wick/range ratio
    pub avg_wick_ratio: f64,
    /// Volatility unit the bodies were normalized by
    pub volatility_unit: f64,
}

/// Map a score to its band. Ties land in the higher band: a score
/// exactly at a threshold reads as the stronger, less fadeable case.
pub fn assess(score: f64, low: f64, high: f64) -> DisplacementBand {
    if score >= high {
        DisplacementBand::TooStrong
    } else if score >= low {
        DisplacementBand::Ambiguous
    } else {
        DisplacementBand::Fadeable
    }
}

/// Score a price move over `window`.
///
/// score = (mean body / volatility unit)
///       x directionally-consistent bar count
///       x (1 - mean wick ratio)
pub fn displacement_index(
    window: &[Bar],
    volatility_unit: f64,
    low: f64,
    high: f64,
) -> DisplacementResult {
    if window.is_empty() || volatility_unit <= 0.0 {
        return DisplacementResult {
            score: 0.0,
            band: assess(0.0, low, high),
            avg_body_points: 0.0,
            avg_body_ratio: 0.0,
            consistent_bars: 0,
            avg_wick_ratio: 1.0,
            volatility_unit,
        };
    }

    let n = window.len() as f64;
    let avg_body_points = window.iter().map(Bar::body).sum::<f64>() / n;

    // Ratio components skip zero-range bars instead of dividing by zero
    let mut body_ratio_sum = 0.0;
    let mut wick_ratio_sum = 0.0;
    let mut ranged_bars = 0usize;
    for bar in window {
        let range = bar.range();
        if range > 0.0 {
            body_ratio_sum += bar.body() / range;
            wick_ratio_sum += bar.wicks() / range;
            ranged_bars += 1;
        }
    }
    let (avg_body_ratio, avg_wick_ratio) = if ranged_bars > 0 {
        (
            body_ratio_sum / ranged_bars as f64,
            wick_ratio_sum / ranged_bars as f64,
        )
    } else {
        (0.0, 1.0)
    };

    // Net direction of the window decides which bodies count as consistent
    let first = &window[0];
    let last = &window[window.len() - 1];
    let net_up = last.close >= first.open;
    let consistent_bars = window
        .iter()
        .filter(|b| if net_up { b.is_bullish() } else { b.is_bearish() })
        .count();

    let score =
        (avg_body_points / volatility_unit) * consistent_bars as f64 * (1.0 - avg_wick_ratio);

    DisplacementResult {
        score,
        band: assess(score, low, high),
        avg_body_points,
        avg_body_ratio,
        consistent_bars,
        avg_wick_ratio,
        volatility_unit,
    }
}

/// Trailing simple-mean ATR over the last `period` bars.
///
/// Falls back to 1.5x the last bar's range when the series is too short
/// or degenerate, so a sweep on thin data still has a usable unit.
pub fn average_true_range(bars: &[Bar], period: usize) -> f64 {
    let fallback = bars.last().map(|b| b.range() * 1.5).unwrap_or(0.0);
    if bars.len() < 2 || period == 0 {
        return fallback;
    }

    let start = bars.len().saturating_sub(period + 1);
    let window = &bars[start..];

    let mut sum_tr = 0.0;
    let mut count = 0usize;
    let mut prev_close = window[0].close;
    for bar in &window[1..] {
        let tr = bar
            .range()
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        sum_tr += tr;
        count += 1;
        prev_close = bar.close;
    }

    let atr = sum_tr / count as f64;
    if atr > 0.0 {
        atr
    } else {
        fallback
    }
}
