// =============================================================================
// Standard Deviation (population, divide by N)
// =============================================================================
//
// For every trailing window of `period` closes:
//   mean     = Σx / period
//   variance = Σ(x - mean)² / period
//   σ        = √variance
//
// Each window is recomputed from scratch with the two-pass formula, so σ is
// exactly zero on a flat window.
// =============================================================================

use super::{undefined_series, IndicatorSeries};
use crate::error::{check_period, Result};

/// Compute the rolling population standard deviation of `closes`.
///
/// Positions before `period - 1` are `None`; every defined value is `>= 0`.
///
/// # Errors
/// `IndicatorError::InvalidPeriod` when `period == 0`.
pub fn stddev(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    check_period("period", period)?;

    let mut result = undefined_series(closes.len());
    if closes.len() < period {
        return Ok(result);
    }

    let period_f = period as f64;
    for (offset, window) in closes.windows(period).enumerate() {
        let mean = window.iter().sum::<f64>() / period_f;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period_f;
        result[offset + period - 1] = Some(variance.sqrt());
    }

    Ok(result)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_textbook_sample() {
        let sample = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let result = stddev(&sample, 8).unwrap();
        assert_eq!(result[7], Some(2.0));
        assert!(result[..7].iter().all(Option::is_none));
    }

    #[test]
    fn stddev_uses_population_divisor() {
        // [10,12,14,16,18]: Σ(x-14)² = 40, 40/5 = 8 (sample divisor would give 10).
        let closes = vec![10.0, 12.0, 14.0, 16.0, 18.0];
        let result = stddev(&closes, 5).unwrap();
        assert!((result[4].unwrap() - 8.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn stddev_flat_window_is_zero() {
        let result = stddev(&[100.0; 25], 20).unwrap();
        for v in result.iter().skip(19) {
            assert_eq!(*v, Some(0.0));
        }
    }

    #[test]
    fn stddev_insufficient_data() {
        assert_eq!(stddev(&[1.0, 2.0], 3).unwrap(), vec![None, None]);
    }

    #[test]
    fn stddev_never_negative() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 50.0 + (i as f64 * 1.3).cos() * 4.0 - (i % 7) as f64)
            .collect();
        let result = stddev(&closes, 10).unwrap();
        assert_eq!(result.len(), closes.len());
        for v in result.iter().flatten() {
            assert!(*v >= 0.0, "stddev {v} is negative");
        }
        assert_eq!(result.iter().position(Option::is_some), Some(9));
    }

    #[test]
    fn stddev_period_one_is_zero() {
        let result = stddev(&[3.0, 8.0, -2.0], 1).unwrap();
        assert_eq!(result, vec![Some(0.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn stddev_zero_period_rejected() {
        assert!(stddev(&[1.0, 2.0, 3.0], 0).is_err());
    }
}
