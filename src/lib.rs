// =============================================================================
// deriv-ta: rolling technical indicators plus a Deriv API client
// =============================================================================
//
// `indicators` is pure numeric code over `&[f64]`: SMA, EMA, population
// standard deviation, Bollinger Bands and MACD. Every output series has the
// input's length, with `None` where there is not enough history yet.
//
// `deriv` is an async WebSocket client that can supply those price series;
// the indicators do not depend on it.
// =============================================================================

pub mod deriv;
pub mod error;
pub mod indicators;
pub mod runtime_config;
pub mod types;

pub use error::{IndicatorError, Result};
pub use indicators::{
    bollinger_bands, ema, macd, sma, stddev, BollingerBands, BollingerParams, IndicatorSeries, Macd,
    MacdParams,
};
