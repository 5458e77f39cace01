// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the population standard deviation
// over the same window.
//
// Defaults: period 20, k = 2.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::{sma, stddev, IndicatorSeries};
use crate::error::{check_period, IndicatorError, Result};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

fn default_period() -> usize {
    DEFAULT_PERIOD
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

/// Tunable Bollinger parameters (config-file friendly).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerParams {
    #[serde(default = "default_period")]
    pub period: usize,
    /// Number of standard deviations between the middle and outer bands.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl BollingerParams {
    /// Reject a zero period or a non-finite multiplier.
    pub fn validate(&self) -> Result<()> {
        check_period("period", self.period)?;
        if !self.multiplier.is_finite() {
            return Err(IndicatorError::InvalidMultiplier(self.multiplier));
        }
        Ok(())
    }
}

/// The three bands, each aligned with the input closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: IndicatorSeries,
    pub middle: IndicatorSeries,
    pub lower: IndicatorSeries,
}

/// Calculate Bollinger Bands for the given closing prices.
///
/// - `middle` = SMA(`period`)
/// - `upper`  = middle + `multiplier` * σ
/// - `lower`  = middle - `multiplier` * σ
///
/// A band is `None` wherever either the SMA or σ is undefined (both share the
/// same warm-up, so that is every position before `period - 1`).
///
/// # Errors
/// Rejects `period == 0` and a NaN/infinite `multiplier` before computing.
pub fn bollinger_bands(closes: &[f64], period: usize, multiplier: f64) -> Result<BollingerBands> {
    BollingerParams { period, multiplier }.validate()?;

    let middle = sma(closes, period)?;
    let width = stddev(closes, period)?;

    let (upper, lower): (IndicatorSeries, IndicatorSeries) = middle
        .iter()
        .zip(&width)
        .map(|(mid, dev)| match (mid, dev) {
            (Some(mid), Some(dev)) => (Some(mid + multiplier * dev), Some(mid - multiplier * dev)),
            _ => (None, None),
        })
        .unzip();

    Ok(BollingerBands {
        upper,
        middle,
        lower,
    })
}

/// Bollinger Bands with the standard 20-period, 2σ settings.
pub fn bollinger_bands_default(closes: &[f64]) -> Result<BollingerBands> {
    bollinger_bands(closes, DEFAULT_PERIOD, DEFAULT_MULTIPLIER)
}
