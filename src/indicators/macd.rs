// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// Three output lines, all aligned with the input closes:
//
//   macd[i]      = EMA(fast)[i] - EMA(slow)[i]
//   signal[i]    = EMA(zero_filled(macd), signal_period)[i], masked
//   histogram[i] = macd[i] - signal[i]
//
// Signal construction is a compute-then-mask protocol:
//   1. Every undefined macd slot is replaced by 0.0.
//   2. The signal EMA runs over that zero-filled series, so the warm-up zeros
//      take part in the seed mean and in every later recurrence step.
//   3. Every position before `max(fast, slow) - 1 + signal_period - 1` is
//      overwritten with `None`.
//
// Step 2 makes the signal line differ from an EMA seeded on the first real
// macd value; the zeros must stay in.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::{ema, undefined_series, IndicatorSeries};
use crate::error::{check_period, Result};

pub const DEFAULT_FAST_PERIOD: usize = 12;
pub const DEFAULT_SLOW_PERIOD: usize = 26;
pub const DEFAULT_SIGNAL_PERIOD: usize = 9;

fn default_fast_period() -> usize {
    DEFAULT_FAST_PERIOD
}

fn default_slow_period() -> usize {
    DEFAULT_SLOW_PERIOD
}

fn default_signal_period() -> usize {
    DEFAULT_SIGNAL_PERIOD
}

/// Tunable MACD periods (config-file friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdParams {
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
    #[serde(default = "default_signal_period")]
    pub signal_period: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast_period: DEFAULT_FAST_PERIOD,
            slow_period: DEFAULT_SLOW_PERIOD,
            signal_period: DEFAULT_SIGNAL_PERIOD,
        }
    }
}

impl MacdParams {
    /// Reject any zero period.
    pub fn validate(&self) -> Result<()> {
        check_period("fast_period", self.fast_period)?;
        check_period("slow_period", self.slow_period)?;
        check_period("signal_period", self.signal_period)
    }

    /// Index of the first defined macd value.
    pub fn first_macd_index(&self) -> usize {
        self.fast_period.max(self.slow_period).saturating_sub(1)
    }

    /// Index of the first defined signal / histogram value.
    pub fn first_signal_index(&self) -> usize {
        self.first_macd_index()
            .saturating_add(self.signal_period)
            .saturating_sub(1)
    }
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macd {
    pub macd: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

/// Compute MACD for `closes`.
///
/// # Warm-up
/// - `macd` is `None` before `max(fast, slow) - 1`.
/// - `signal` and `histogram` are `None` before
///   `max(fast, slow) - 1 + signal_period - 1`.
///
/// # Errors
/// `IndicatorError::InvalidPeriod` when any of the three periods is zero.
pub fn macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<Macd> {
    let params = MacdParams {
        fast_period,
        slow_period,
        signal_period,
    };
    params.validate()?;

    let fast = ema(closes, fast_period)?;
    let slow = ema(closes, slow_period)?;

    let macd_line: IndicatorSeries = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    // --- Signal: EMA over the zero-filled macd line, then mask ---------------
    let zero_filled: Vec<f64> = macd_line.iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut signal = ema(&zero_filled, signal_period)?;

    let first_signal = params.first_signal_index().min(signal.len());
    signal[..first_signal].fill(None);

    // --- Histogram ------------------------------------------------------------
    let mut histogram = undefined_series(closes.len());
    for (i, slot) in histogram.iter_mut().enumerate() {
        if let (Some(m), Some(s)) = (macd_line[i], signal[i]) {
            *slot = Some(m - s);
        }
    }

    Ok(Macd {
        macd: macd_line,
        signal,
        histogram,
    })
}

/// MACD with the standard 12 / 26 / 9 periods.
pub fn macd_default(closes: &[f64]) -> Result<Macd> {
    macd(
        closes,
        DEFAULT_FAST_PERIOD,
        DEFAULT_SLOW_PERIOD,
        DEFAULT_SIGNAL_PERIOD,
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndicatorError;

    /// 10, 11, ..., 59
    fn ramp() -> Vec<f64> {
        (10..60).map(|x| x as f64).collect()
    }

    #[test]
    fn macd_warm_up_boundaries() {
        let result = macd(&ramp(), 12, 26, 9).unwrap();

        assert_eq!(result.macd[24], None);
        assert!(result.macd[25].is_some());

        assert_eq!(result.signal[32], None);
        assert!(result.signal[33].is_some());

        assert_eq!(result.histogram[32], None);
        assert_eq!(
            result.histogram[33],
            Some(result.macd[33].unwrap() - result.signal[33].unwrap())
        );
    }

    #[test]
    fn macd_lengths_match_input() {
        let closes = ramp();
        let result = macd_default(&closes).unwrap();
        assert_eq!(result.macd.len(), closes.len());
        assert_eq!(result.signal.len(), closes.len());
        assert_eq!(result.histogram.len(), closes.len());
    }

    #[test]
    fn macd_histogram_is_difference_everywhere() {
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.15).sin() * 8.0 + i as f64 * 0.05)
            .collect();
        let result = macd_default(&closes).unwrap();
        for i in 0..closes.len() {
            match (result.macd[i], result.signal[i], result.histogram[i]) {
                (Some(m), Some(s), Some(h)) => assert_eq!(h, m - s),
                (_, None, None) => assert!(i < 33),
                other => panic!("unexpected combination at {i}: {other:?}"),
            }
        }
    }

    #[test]
    fn macd_line_is_fast_minus_slow() {
        let closes = ramp();
        let result = macd(&closes, 12, 26, 9).unwrap();
        let fast = ema(&closes, 12).unwrap();
        let slow = ema(&closes, 26).unwrap();
        for i in 25..closes.len() {
            assert_eq!(result.macd[i], Some(fast[i].unwrap() - slow[i].unwrap()));
        }
    }

    #[test]
    fn signal_includes_zero_filled_warm_up() {
        // The signal seed averages the zero placeholders, so the first
        // unmasked value equals EMA(zero_filled)[33], not an EMA seeded from
        // the first real macd values.
        let closes = ramp();
        let result = macd(&closes, 12, 26, 9).unwrap();

        let zero_filled: Vec<f64> = result.macd.iter().map(|v| v.unwrap_or(0.0)).collect();
        let raw = ema(&zero_filled, 9).unwrap();
        assert_eq!(result.signal[33], raw[33]);
        for i in 33..closes.len() {
            assert_eq!(result.signal[i], raw[i]);
        }

        let real_macd: Vec<f64> = result.macd.iter().flatten().copied().collect();
        let clean = ema(&real_macd, 9).unwrap();
        // real_macd[8] lines up with position 33 of the full series.
        let clean_first = clean[8].unwrap();
        assert!((result.signal[33].unwrap() - clean_first).abs() > 1e-6);
    }

    #[test]
    fn macd_fast_slower_than_slow_uses_max() {
        // Swapped periods still wait for the longer EMA.
        let result = macd(&ramp(), 26, 12, 9).unwrap();
        assert_eq!(result.macd[24], None);
        assert!(result.macd[25].is_some());
        assert_eq!(result.signal[32], None);
        assert!(result.signal[33].is_some());
    }

    #[test]
    fn macd_insufficient_data() {
        let closes: Vec<f64> = (0..20).map(|x| x as f64).collect();
        let result = macd_default(&closes).unwrap();
        assert!(result.macd.iter().all(Option::is_none));
        assert!(result.signal.iter().all(Option::is_none));
        assert!(result.histogram.iter().all(Option::is_none));
    }

    #[test]
    fn macd_short_of_signal_window() {
        // macd defined at 25..30, but the signal needs index 33.
        let closes: Vec<f64> = (0..30).map(|x| x as f64).collect();
        let result = macd_default(&closes).unwrap();
        assert_eq!(result.macd.iter().flatten().count(), 5);
        assert!(result.signal.iter().all(Option::is_none));
        assert!(result.histogram.iter().all(Option::is_none));
    }

    #[test]
    fn macd_empty_input() {
        let result = macd_default(&[]).unwrap();
        assert!(result.macd.is_empty());
        assert!(result.signal.is_empty());
        assert!(result.histogram.is_empty());
    }

    #[test]
    fn macd_rejects_zero_periods() {
        let closes = ramp();
        assert_eq!(
            macd(&closes, 0, 26, 9),
            Err(IndicatorError::InvalidPeriod {
                name: "fast_period",
                period: 0
            })
        );
        assert_eq!(
            macd(&closes, 12, 0, 9),
            Err(IndicatorError::InvalidPeriod {
                name: "slow_period",
                period: 0
            })
        );
        assert_eq!(
            macd(&closes, 12, 26, 0),
            Err(IndicatorError::InvalidPeriod {
                name: "signal_period",
                period: 0
            })
        );
    }

    #[test]
    fn params_indices() {
        let params = MacdParams::default();
        assert_eq!(params.first_macd_index(), 25);
        assert_eq!(params.first_signal_index(), 33);
    }

    #[test]
    fn index_arithmetic_saturates() {
        let huge_signal = MacdParams {
            signal_period: usize::MAX,
            ..MacdParams::default()
        };
        assert_eq!(huge_signal.first_signal_index(), usize::MAX - 1);

        let unchecked = MacdParams {
            fast_period: 0,
            slow_period: 0,
            signal_period: 0,
        };
        assert_eq!(unchecked.first_macd_index(), 0);
        assert_eq!(unchecked.first_signal_index(), 0);
    }

    #[test]
    fn oversized_signal_period_leaves_signal_undefined() {
        let result = macd(&ramp(), 12, 26, usize::MAX).unwrap();
        assert_eq!(result.signal.len(), 50);
        assert!(result.signal.iter().all(Option::is_none));
        assert!(result.histogram.iter().all(Option::is_none));
        assert_eq!(result.macd.iter().position(Option::is_some), Some(25));
    }
}
