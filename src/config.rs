//! Strategy configuration
//!
//! One immutable snapshot passed into every component at construction.
//! Nothing in the core reads ambient global state or mutates the
//! snapshot after startup; tuning a parameter means building a new
//! engine with a new snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frozen parameter set for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Primary (traded) instrument, e.g. "NQ"
    pub primary_symbol: String,

    /// Correlated reference instrument for divergence checks, e.g. "ES"
    pub reference_symbol: String,

    /// Complete trading days averaged for the range normalizer
    pub adr_lookback_days: usize,

    /// Bars averaged for the volatility unit (ATR)
    pub atr_period: usize,

    /// Lower bound of the valid overnight-range / ADR ratio interval
    pub overnight_min_ratio: f64,

    /// Upper bound of the valid overnight-range / ADR ratio interval
    pub overnight_max_ratio: f64,

    /// Displacement score below this is fadeable
    pub displacement_low: f64,

    /// Displacement score at or above this is too strong to fade
    pub displacement_high: f64,

    /// Bars looked back for the sweep extreme once a sweep prints
    pub sweep_extreme_lookback: usize,

    /// Minutes after the window opens before the sweep wait times out
    pub sweep_timeout_minutes: f64,

    /// Minutes after the sweep before the reclaim wait times out
    pub reclaim_timeout_minutes: f64,

    /// Minimum body/range ratio for a reclaim candle
    pub reclaim_min_body_ratio: f64,

    /// Stop buffer beyond the sweep extreme, in points
    pub stop_buffer_points: f64,

    /// Profit target in R-multiples of initial risk
    pub target_r_multiple: f64,

    /// Hard cap on real trades per session
    pub max_trades_per_session: u32,

    /// Real trades required before shadow review unlocks
    pub review_lock_threshold: usize,

    /// Trading window open, ET wall clock
    pub window_start: (u32, u32),

    /// Trading window close, ET wall clock
    pub window_end: (u32, u32),

    /// Max (symbol, date) entries memoized inside the signal engine
    pub signal_cache_capacity: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            primary_symbol: "NQ".to_string(),
            reference_symbol: "ES".to_string(),
            adr_lookback_days: 20,
            atr_period: 14,
            overnight_min_ratio: 0.30,
            overnight_max_ratio: 0.70,
            displacement_low: 1.2,
            displacement_high: 2.0,
            sweep_extreme_lookback: 20,
            sweep_timeout_minutes: 45.0,
            reclaim_timeout_minutes: 45.0,
            reclaim_min_body_ratio: 0.5,
            stop_buffer_points: 2.0,
            target_r_multiple: 1.0,
            max_trades_per_session: 1,
            review_lock_threshold: 50,
            window_start: (9, 30),
            window_end: (10, 30),
            signal_cache_capacity: 64,
        }
    }
}

impl StrategyConfig {
    /// Load a snapshot from a JSON file; absent fields keep defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check the parameter set before handing it to the engine
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.overnight_min_ratio < self.overnight_max_ratio,
            "overnight ratio interval is empty: [{}, {}]",
            self.overnight_min_ratio,
            self.overnight_max_ratio
        );
        anyhow::ensure!(
            self.displacement_low < self.displacement_high,
            "displacement thresholds out of order: {} >= {}",
            self.displacement_low,
            self.displacement_high
        );
        anyhow::ensure!(self.adr_lookback_days > 0, "adr_lookback_days must be positive");
        anyhow::ensure!(self.atr_period > 0, "atr_period must be positive");
        anyhow::ensure!(
            self.reclaim_min_body_ratio > 0.0 && self.reclaim_min_body_ratio <= 1.0,
            "reclaim_min_body_ratio must be in (0, 1]"
        );
        anyhow::ensure!(self.signal_cache_capacity > 0, "signal cache needs capacity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.adr_lookback_days, 20);
        assert_eq!(config.max_trades_per_session, 1);
        assert_eq!(config.review_lock_threshold, 50);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"overnight_min_ratio": 0.25}"#).unwrap();
        assert!((config.overnight_min_ratio - 0.25).abs() < 1e-12);
        assert!((config.overnight_max_ratio - 0.70).abs() < 1e-12);
        assert_eq!(config.primary_symbol, "NQ");
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let config = StrategyConfig {
            overnight_min_ratio: 0.8,
            overnight_max_ratio: 0.3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
