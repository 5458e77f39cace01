// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Trailing arithmetic mean over exactly `period` samples:
//   SMA_t = (close_{t-period+1} + ... + close_t) / period
//
// The window sum is maintained incrementally (one subtract, one add per step)
// so the whole series costs O(n).
// =============================================================================

use super::{undefined_series, IndicatorSeries};
use crate::error::{check_period, Result};

/// Compute the SMA series for `closes` and look-back `period`.
///
/// The output is aligned with the input: positions before `period - 1` are
/// `None`, and when `closes.len() < period` every position is `None`.
///
/// # Errors
/// `IndicatorError::InvalidPeriod` when `period == 0`.
pub fn sma(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    check_period("period", period)?;

    let mut result = undefined_series(closes.len());
    if closes.len() < period {
        return Ok(result);
    }

    let period_f = period as f64;
    let mut sum: f64 = closes[..period].iter().sum();
    result[period - 1] = Some(sum / period_f);

    for i in period..closes.len() {
        sum = sum - closes[i - period] + closes[i];
        result[i] = Some(sum / period_f);
    }

    Ok(result)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndicatorError;

    fn reference() -> Vec<f64> {
        vec![10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0, 26.0, 28.0]
    }

    #[test]
    fn sma_reference_values() {
        let result = sma(&reference(), 5).unwrap();
        assert_eq!(&result[..4], &[None, None, None, None]);
        assert_eq!(result[4], Some(14.0));
        assert_eq!(result[5], Some(16.0));
        assert_eq!(result[9], Some(24.0));
    }

    #[test]
    fn sma_insufficient_data_is_all_undefined() {
        let result = sma(&[1.0, 2.0, 3.0], 5).unwrap();
        assert_eq!(result, vec![None, None, None]);
    }

    #[test]
    fn sma_empty_input() {
        assert!(sma(&[], 3).unwrap().is_empty());
    }

    #[test]
    fn sma_period_one_is_identity() {
        let closes = vec![3.5, -1.0, 7.25];
        let result = sma(&closes, 1).unwrap();
        assert_eq!(result, vec![Some(3.5), Some(-1.0), Some(7.25)]);
    }

    #[test]
    fn sma_period_equals_length() {
        let result = sma(&[2.0, 4.0, 6.0], 3).unwrap();
        assert_eq!(result, vec![None, None, Some(4.0)]);
    }

    #[test]
    fn sma_output_length_matches_input() {
        for n in 0..40 {
            let closes: Vec<f64> = (0..n).map(|x| x as f64 * 1.5).collect();
            assert_eq!(sma(&closes, 7).unwrap().len(), n);
        }
    }

    #[test]
    fn sma_incremental_matches_direct_mean() {
        let closes: Vec<f64> = (0..500)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 12.5)
            .collect();
        let period = 14;
        let result = sma(&closes, period).unwrap();
        for i in period - 1..closes.len() {
            let window = &closes[i + 1 - period..=i];
            let direct = window.iter().sum::<f64>() / period as f64;
            let got = result[i].unwrap();
            assert!(
                (got - direct).abs() < 1e-9,
                "position {i}: got {got}, expected {direct}"
            );
        }
    }

    #[test]
    fn sma_zero_period_rejected() {
        assert_eq!(
            sma(&reference(), 0),
            Err(IndicatorError::InvalidPeriod {
                name: "period",
                period: 0
            })
        );
    }
}
