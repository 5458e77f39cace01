// =============================================================================
// Indicator Errors
// =============================================================================
//
// Insufficient history is never an error: it is reported in-band as `None`
// entries in the returned series. The only failures are configuration
// mistakes, which are rejected before any computation runs.

use thiserror::Error;

/// Invalid indicator configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    /// A look-back period of zero was supplied.
    #[error("invalid {name} {period}: period must be at least 1")]
    InvalidPeriod {
        /// Which parameter was rejected (`"period"`, `"fast_period"`, ...).
        name: &'static str,
        period: usize,
    },

    /// The band multiplier is NaN or infinite.
    #[error("invalid multiplier {0}: must be a finite number")]
    InvalidMultiplier(f64),
}

pub type Result<T> = std::result::Result<T, IndicatorError>;

/// Reject a zero period for the parameter called `name`.
pub(crate) fn check_period(name: &'static str, period: usize) -> Result<()> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { name, period });
    }
    Ok(())
}
