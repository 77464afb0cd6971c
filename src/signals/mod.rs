//! Signal pipeline
//!
//! Pure computations from bar windows to normalized signals:
//! - Anchor price (midnight open, America/New_York)
//! - Range normalizer (ADR) and overnight-range ratio
//! - Displacement index with band assessment
//! - Cross-instrument sweep divergence
//!
//! `SignalEngine` fronts the free functions with a bounded memo cache
//! for the two expensive per-date values (anchor and normalizer), which
//! are requested repeatedly within a session. Everything else is
//! recomputed on demand; all operations are deterministic for identical
//! windows.

pub mod anchor;
pub mod displacement;
pub mod divergence;
pub mod range;

pub use anchor::anchor_price;
pub use displacement::{
    assess, average_true_range, displacement_index, DisplacementBand, DisplacementResult,
};
pub use divergence::{
    cross_instrument_divergence, detect_sweep, DivergenceResult, SweepDirection, SweepProbe,
};
pub use range::{
    daily_ranges, overnight_range_ratio, range_normalizer, DailyRange, OvernightRangeCheck,
};

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::bars::Bar;
use crate::config::StrategyConfig;
use crate::error::SignalError;

/// Signal computation front-end owning the per-date memo cache
pub struct SignalEngine {
    config: StrategyConfig,
    anchor_cache: BTreeMap<(String, NaiveDate), f64>,
    normalizer_cache: BTreeMap<(String, NaiveDate), f64>,
}

impl SignalEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            anchor_cache: BTreeMap::new(),
            normalizer_cache: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Anchor price for `symbol` on `date`, memoized
    pub fn anchor_price(
        &mut self,
        bars: &[Bar],
        symbol: &str,
        date: NaiveDate,
    ) -> Result<f64, SignalError> {
        let key = (symbol.to_string(), date);
        if let Some(&price) = self.anchor_cache.get(&key) {
            return Ok(price);
        }
        let price = anchor::anchor_price(bars, symbol, date)?;
        self.anchor_cache.insert(key, price);
        Self::enforce_capacity(&mut self.anchor_cache, self.config.signal_cache_capacity);
        Ok(price)
    }

    /// Mean daily range over the trailing configured lookback, memoized
    pub fn range_normalizer(
        &mut self,
        bars: &[Bar],
        symbol: &str,
        date: NaiveDate,
    ) -> Result<f64, SignalError> {
        let key = (symbol.to_string(), date);
        if let Some(&adr) = self.normalizer_cache.get(&key) {
            return Ok(adr);
        }
        let days = range::daily_ranges(bars);
        let adr = range::range_normalizer(&days, date, self.config.adr_lookback_days)?;
        self.normalizer_cache.insert(key, adr);
        Self::enforce_capacity(&mut self.normalizer_cache, self.config.signal_cache_capacity);
        Ok(adr)
    }

    /// Overnight-range ratio validated against the configured interval
    pub fn overnight_range_ratio(
        &mut self,
        bars: &[Bar],
        symbol: &str,
        date: NaiveDate,
    ) -> Result<OvernightRangeCheck, SignalError> {
        let normalizer = self.range_normalizer(bars, symbol, date)?;
        range::overnight_range_ratio(
            bars,
            symbol,
            date,
            normalizer,
            self.config.overnight_min_ratio,
            self.config.overnight_max_ratio,
        )
    }

    /// Displacement index over a window, using configured thresholds
    pub fn displacement_index(&self, window: &[Bar], volatility_unit: f64) -> DisplacementResult {
        displacement::displacement_index(
            window,
            volatility_unit,
            self.config.displacement_low,
            self.config.displacement_high,
        )
    }

    /// Volatility unit (trailing ATR) for a bar series
    pub fn volatility_unit(&self, bars: &[Bar]) -> f64 {
        displacement::average_true_range(bars, self.config.atr_period)
    }

    /// Sweep divergence between the primary and reference instruments
    pub fn cross_instrument_divergence(
        &self,
        primary_bars: &[Bar],
        reference_bars: &[Bar],
        primary_level: f64,
        reference_level: f64,
        direction: SweepDirection,
    ) -> DivergenceResult {
        let primary_unit = self.volatility_unit(primary_bars);
        let reference_unit = self.volatility_unit(reference_bars);
        divergence::cross_instrument_divergence(
            primary_bars,
            reference_bars,
            primary_level,
            reference_level,
            primary_unit,
            reference_unit,
            direction,
        )
    }

    /// Drop memoized values for `date`. Called on session reset so a
    /// re-run of the same date recomputes from current data.
    pub fn invalidate(&mut self, date: NaiveDate) {
        self.anchor_cache.retain(|(_, d), _| *d != date);
        self.normalizer_cache.retain(|(_, d), _| *d != date);
        debug!(%date, "signal cache invalidated for session date");
    }

    fn enforce_capacity(cache: &mut BTreeMap<(String, NaiveDate), f64>, capacity: usize) {
        while cache.len() > capacity {
            cache.pop_first();
        }
    }
}
