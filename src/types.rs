// =============================================================================
// Deriv API wire types
// =============================================================================
//
// Request and response payloads for the subset of the Deriv WebSocket API v3
// that the client speaks. Only the fields the crate reads are typed; anything
// else the server sends is kept in a flattened `extra` map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Deriv sends most prices as JSON numbers, but some endpoints (candles on
/// older API versions, balances on some account types) send numeric strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number is not a valid f64")),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse {s:?} as f64: {e}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or numeric string, got {other}"
        ))),
    }
}

fn epoch_to_utc(epoch: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch, 0)
}

// =============================================================================
// Account
// =============================================================================

/// Account balance snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    #[serde(deserialize_with = "number_or_string")]
    pub balance: f64,
    pub loginid: String,
}

impl Balance {
    /// Virtual (demo) accounts have login ids starting with `VR`.
    pub fn is_virtual(&self) -> bool {
        self.loginid.starts_with("VR")
    }
}

/// One entry of an `active_symbols` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSymbol {
    pub symbol: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub market: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Ticks & history
// =============================================================================

/// A single streamed price tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    #[serde(deserialize_with = "number_or_string")]
    pub quote: f64,
    pub epoch: i64,
    pub symbol: String,
    #[serde(default)]
    pub pip_size: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tick {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.epoch)
    }
}

/// Shape of a `ticks_history` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStyle {
    Ticks,
    Candles,
}

/// `ticks_history` request. Optional fields are omitted from the wire when
/// unset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjust_start_time: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Epoch seconds as a string, or `"latest"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Candle size in seconds (candles style only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<HistoryStyle>,
}

/// Default number of samples requested when the caller does not say.
pub const DEFAULT_HISTORY_COUNT: u32 = 100;

impl TicksHistoryRequest {
    /// The most recent `DEFAULT_HISTORY_COUNT` ticks for `symbol`.
    pub fn ticks(symbol: impl Into<String>) -> Self {
        Self {
            ticks_history: symbol.into(),
            count: Some(DEFAULT_HISTORY_COUNT),
            end: Some("latest".to_string()),
            style: Some(HistoryStyle::Ticks),
            ..Self::default()
        }
    }

    /// The most recent `count` candles of `granularity` seconds.
    pub fn candles(symbol: impl Into<String>, granularity: u32, count: u32) -> Self {
        Self {
            ticks_history: symbol.into(),
            count: Some(count),
            end: Some("latest".to_string()),
            granularity: Some(granularity),
            style: Some(HistoryStyle::Candles),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Start the window at `start` (epoch seconds). Deriv is asked to shift
    /// the start forward when the market was closed at that time.
    pub fn with_start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self.adjust_start_time = Some(1);
        self
    }
}

/// Tick history as parallel price / time arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub prices: Vec<f64>,
    #[serde(default)]
    pub times: Vec<i64>,
}

/// OHLC candle from a `ticks_history` response in candles style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub epoch: i64,
    #[serde(deserialize_with = "number_or_string")]
    pub open: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub high: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub low: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub close: f64,
}

impl Candle {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.epoch)
    }
}

/// `ticks_history` response: either `history` or `candles` is present,
/// depending on the requested style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicksHistory {
    #[serde(default)]
    pub history: Option<History>,
    #[serde(default)]
    pub candles: Option<Vec<Candle>>,
    #[serde(default)]
    pub pip_size: Option<u32>,
}

impl TicksHistory {
    /// Chronological price series suitable for the indicator functions:
    /// tick prices, or candle closes when the response is in candles style.
    pub fn prices(&self) -> Vec<f64> {
        if let Some(history) = &self.history {
            return history.prices.clone();
        }
        self.candles
            .as_deref()
            .map(|candles| candles.iter().map(|c| c.close).collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Contracts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    Stake,
    Payout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    #[serde(rename = "t")]
    Ticks,
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
}

/// Price proposal request (`proposal: 1` is added by the client).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProposalRequest {
    pub contract_type: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basis: Option<Basis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<DurationUnit>,
}

/// Priced contract offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(deserialize_with = "number_or_string")]
    pub ask_price: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub payout: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub spot: f64,
    pub spot_time: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
