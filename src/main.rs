// =============================================================================
// deriv-ta: indicator demonstration
// =============================================================================
//
// Computes SMA, EMA, Bollinger Bands and MACD over a price series and logs
// the most recent values. The series is fetched from Deriv tick history when
// `DERIV_APP_ID` is set, otherwise a built-in sample is used.
// =============================================================================

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deriv_ta::deriv::DerivClient;
use deriv_ta::indicators::{self, last_defined};
use deriv_ta::runtime_config::RuntimeConfig;
use deriv_ta::types::TicksHistoryRequest;

/// Built-in sample: a gently rising, zig-zagging price path.
const DEMO_SERIES: [f64; 30] = [
    100.0, 102.0, 101.0, 103.0, 105.0, 104.0, 106.0, 108.0, 107.0, 109.0, //
    111.0, 110.0, 112.0, 114.0, 113.0, 115.0, 117.0, 116.0, 118.0, 120.0, //
    122.0, 121.0, 123.0, 125.0, 124.0, 126.0, 128.0, 127.0, 129.0, 131.0,
];

/// Number of trailing values logged for the moving averages.
const TAIL: usize = 5;

fn tail(series: &[Option<f64>], n: usize) -> &[Option<f64>] {
    &series[series.len().saturating_sub(n)..]
}

async fn fetch_prices(config: &RuntimeConfig) -> Result<Vec<f64>> {
    let client = DerivClient::connect(&config.deriv).await?;
    if !config.deriv.token.is_empty() {
        client.authorize().await?;
    }

    let request = TicksHistoryRequest::ticks(config.symbol.as_str()).with_count(config.history_count);
    let history = client
        .ticks_history(request)
        .await
        .with_context(|| format!("failed to fetch tick history for {}", config.symbol))?;
    client.disconnect().await;

    let prices = history.prices();
    info!(symbol = %config.symbol, samples = prices.len(), "tick history fetched");
    Ok(prices)
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env()?;
    config.validate()?;

    // ── 2. Price series ──────────────────────────────────────────────────
    let prices = if std::env::var("DERIV_APP_ID").is_ok() {
        fetch_prices(&config).await?
    } else {
        info!("DERIV_APP_ID not set, using built-in sample series");
        DEMO_SERIES.to_vec()
    };

    // ── 3. Indicators ────────────────────────────────────────────────────
    let sma = indicators::sma(&prices, config.sma_period)?;
    info!(period = config.sma_period, values = ?tail(&sma, TAIL), "SMA");

    let ema = indicators::ema(&prices, config.ema_period)?;
    info!(period = config.ema_period, values = ?tail(&ema, TAIL), "EMA");

    let bb = indicators::bollinger_bands(
        &prices,
        config.bollinger.period,
        config.bollinger.multiplier,
    )?;
    info!(
        period = config.bollinger.period,
        multiplier = config.bollinger.multiplier,
        upper = ?last_defined(&bb.upper),
        middle = ?last_defined(&bb.middle),
        lower = ?last_defined(&bb.lower),
        "Bollinger Bands"
    );

    let macd = indicators::macd(
        &prices,
        config.macd.fast_period,
        config.macd.slow_period,
        config.macd.signal_period,
    )?;
    info!(
        fast = config.macd.fast_period,
        slow = config.macd.slow_period,
        signal_period = config.macd.signal_period,
        macd = ?macd.macd.last().copied().flatten(),
        signal = ?macd.signal.last().copied().flatten(),
        histogram = ?macd.histogram.last().copied().flatten(),
        "MACD"
    );

    Ok(())
}
