// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the rolling indicators. Every
// function takes the full close series and returns output of exactly the
// same length, with `None` marking positions that lack enough history.
// Invalid parameters are rejected up front with an `IndicatorError`.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod sma;
pub mod stddev;

pub use bollinger::{bollinger_bands, bollinger_bands_default, BollingerBands, BollingerParams};
pub use ema::ema;
pub use macd::{macd, macd_default, Macd, MacdParams};
pub use sma::sma;
pub use stddev::stddev;

/// Indicator output aligned position-for-position with its input series.
/// `None` means "insufficient history at this position".
pub type IndicatorSeries = Vec<Option<f64>>;

/// An all-`None` series of length `len`.
pub(crate) fn undefined_series(len: usize) -> IndicatorSeries {
    vec![None; len]
}

/// Most recent defined value of a series, if any.
pub fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.iter().rev().find_map(|v| *v)
}

/// Number of defined positions in a series.
pub fn defined_count(series: &[Option<f64>]) -> usize {
    series.iter().filter(|v| v.is_some()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_defined_skips_trailing_none() {
        assert_eq!(last_defined(&[None, Some(1.0), Some(2.0), None]), Some(2.0));
        assert_eq!(last_defined(&[None, None]), None);
        assert_eq!(last_defined(&[]), None);
    }

    #[test]
    fn defined_count_counts_some() {
        assert_eq!(defined_count(&[None, Some(0.0), Some(-3.0)]), 2);
    }

    #[test]
    fn windowed_indicators_share_warm_up() {
        let closes: Vec<f64> = (0..40).map(|i| (i as f64).sqrt() * 10.0).collect();
        for period in [1, 2, 5, 13, 40] {
            let first = period - 1;
            for series in [
                sma(&closes, period).unwrap(),
                stddev(&closes, period).unwrap(),
                ema(&closes, period).unwrap(),
            ] {
                assert_eq!(series.len(), closes.len());
                assert_eq!(series.iter().position(Option::is_some), Some(first));
                assert_eq!(defined_count(&series), closes.len() - first);
            }
        }
    }

    #[test]
    fn short_input_is_entirely_undefined() {
        let closes = vec![1.0, 2.0, 3.0, 4.0];
        for period in 5..10 {
            assert_eq!(defined_count(&sma(&closes, period).unwrap()), 0);
            assert_eq!(defined_count(&stddev(&closes, period).unwrap()), 0);
            assert_eq!(defined_count(&ema(&closes, period).unwrap()), 0);
        }
    }
}
