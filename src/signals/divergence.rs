//! Cross-instrument (SMT) divergence
//!
//! One instrument sweeping a reference level while its correlated pair
//! holds is read as a liquidity grab rather than a genuine move. The
//! binary flag is what gates admission in v1; the signed degree is
//! measured and stored alongside it but never consulted by the gate, so
//! degree thresholds can be tuned later without re-deriving history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bars::Bar;

/// Which side of the reference level a sweep must print on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    /// Lows trading through the level (long setups)
    Below,
    /// Highs trading through the level (short setups)
    Above,
}

impl std::fmt::Display for SweepDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepDirection::Below => write!(f, "below"),
            SweepDirection::Above => write!(f, "above"),
        }
    }
}

/// Result of probing one instrument for a sweep of a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepProbe {
    pub swept: bool,
    /// Points traded through the level (0 when no sweep)
    pub depth: f64,
    /// Depth normalized by the instrument's own volatility unit
    pub depth_norm: f64,
    /// Most extreme traded price through the level
    pub extreme: Option<f64>,
    /// Timestamp of the extreme bar
    pub time: Option<DateTime<Utc>>,
}

impl SweepProbe {
    fn none() -> Self {
        Self {
            swept: false,
            depth: 0.0,
            depth_norm: 0.0,
            extreme: None,
            time: None,
        }
    }
}

/// Probe `bars` for a sweep of `level` in `direction`.
///
/// Depth is measured at the most extreme excursion, normalized by the
/// caller-supplied volatility unit for this instrument.
pub fn detect_sweep(
    bars: &[Bar],
    level: f64,
    direction: SweepDirection,
    volatility_unit: f64,
) -> SweepProbe {
    let candidate = match direction {
        SweepDirection::Below => bars
            .iter()
            .filter(|b| b.low < level)
            .min_by(|a, b| a.low.partial_cmp(&b.low).unwrap_or(std::cmp::Ordering::Equal)),
        SweepDirection::Above => bars
            .iter()
            .filter(|b| b.high > level)
            .max_by(|a, b| a.high.partial_cmp(&b.high).unwrap_or(std::cmp::Ordering::Equal)),
    };

    let Some(bar) = candidate else {
        return SweepProbe::none();
    };

    let (extreme, depth) = match direction {
        SweepDirection::Below => (bar.low, level - bar.low),
        SweepDirection::Above => (bar.high, bar.high - level),
    };
    let depth_norm = if volatility_unit > 0.0 {
        depth / volatility_unit
    } else {
        0.0
    };

    SweepProbe {
        swept: true,
        depth,
        depth_norm,
        extreme: Some(extreme),
        time: Some(bar.timestamp),
    }
}

/// Divergence verdict plus the decoupled degree measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceResult {
    /// Primary swept and reference did not
    pub diverged: bool,
    /// primary depth_norm minus reference depth_norm, signed
    pub degree: f64,
    pub primary: SweepProbe,
    pub reference: SweepProbe,
}

/// Compare sweeps of the two instruments against their own levels.
///
/// Each leg is normalized by its own volatility unit so depths compare
/// across instruments with different point scales.
pub fn cross_instrument_divergence(
    primary_bars: &[Bar],
    reference_bars: &[Bar],
    primary_level: f64,
    reference_level: f64,
    primary_volatility_unit: f64,
    reference_volatility_unit: f64,
    direction: SweepDirection,
) -> DivergenceResult {
    let primary = detect_sweep(primary_bars, primary_level, direction, primary_volatility_unit);
    let reference = detect_sweep(
        reference_bars,
        reference_level,
        direction,
        reference_volatility_unit,
    );

    DivergenceResult {
        diverged: primary.swept && !reference.swept,
        degree: primary.depth_norm - reference.depth_norm,
        primary,
        reference,
    }
}
