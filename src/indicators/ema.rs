// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The very first EMA value (at index `period - 1`) is seeded with the plain
// mean of the first `period` closes. Every later value depends on the one
// before it, so the series is produced strictly left to right.
// =============================================================================

use super::{undefined_series, IndicatorSeries};
use crate::error::{check_period, Result};

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// The output has the same length as `closes`. Positions before
/// `period - 1` are `None`; when the input is shorter than `period` the
/// whole series is `None`.
///
/// # Errors
/// `IndicatorError::InvalidPeriod` when `period == 0`.
pub fn ema(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    check_period("period", period)?;

    let mut result = undefined_series(closes.len());
    if closes.len() < period {
        return Ok(result);
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed: mean of the first `period` values.
    let seed = closes[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(seed);

    let mut prev_ema = seed;
    for (i, &close) in closes.iter().enumerate().skip(period) {
        prev_ema = (close - prev_ema) * multiplier + prev_ema;
        result[i] = Some(prev_ema);
    }

    Ok(result)
}
