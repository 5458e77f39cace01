// =============================================================================
// Runtime Configuration: connection settings and indicator parameters
// =============================================================================
//
// Loaded from a JSON file, then overridden from the environment (`.env` is
// read by the binary before this runs). All fields carry `#[serde(default)]`
// so a partial or empty file is always valid.
//
// The API token is never serialised or printed.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::check_period;
use crate::indicators::{BollingerParams, MacdParams};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_app_id() -> u32 {
    1089
}

fn default_endpoint() -> String {
    "ws.derivws.com".to_string()
}

fn default_symbol() -> String {
    "R_100".to_string()
}

fn default_history_count() -> u32 {
    crate::types::DEFAULT_HISTORY_COUNT
}

fn default_short_period() -> usize {
    5
}

// =============================================================================
// DerivConfig
// =============================================================================

/// Connection settings for the Deriv WebSocket API.
#[derive(Clone, Serialize, Deserialize)]
pub struct DerivConfig {
    #[serde(default = "default_app_id")]
    pub app_id: u32,

    /// API token used by `authorize`. Read from `DERIV_TOKEN`; never written
    /// back to disk.
    #[serde(default, skip_serializing)]
    pub token: String,

    /// Host name only, e.g. `ws.derivws.com`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            token: String::new(),
            endpoint: default_endpoint(),
        }
    }
}

impl std::fmt::Debug for DerivConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivConfig")
            .field("app_id", &self.app_id)
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub deriv: DerivConfig,

    /// Symbol whose history feeds the indicators.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Number of ticks requested from history.
    #[serde(default = "default_history_count")]
    pub history_count: u32,

    #[serde(default = "default_short_period")]
    pub sma_period: usize,

    #[serde(default = "default_short_period")]
    pub ema_period: usize,

    #[serde(default)]
    pub bollinger: BollingerParams,

    #[serde(default)]
    pub macd: MacdParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            deriv: DerivConfig::default(),
            symbol: default_symbol(),
            history_count: default_history_count(),
            sma_period: default_short_period(),
            ema_period: default_short_period(),
            bollinger: BollingerParams::default(),
            macd: MacdParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). The token is not written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `DERIV_APP_ID`, `DERIV_TOKEN`, `DERIV_ENDPOINT` and
    /// `DERIV_SYMBOL` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(app_id) = var("DERIV_APP_ID") {
            self.deriv.app_id = app_id
                .trim()
                .parse()
                .with_context(|| format!("DERIV_APP_ID is not a valid app id: {app_id}"))?;
            debug!(app_id = self.deriv.app_id, "app id from environment");
        }
        if let Some(token) = var("DERIV_TOKEN") {
            self.deriv.token = token.trim().to_string();
        }
        if let Some(endpoint) = var("DERIV_ENDPOINT") {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                self.deriv.endpoint = endpoint.to_string();
            }
        }
        if let Some(symbol) = var("DERIV_SYMBOL") {
            let symbol = symbol.trim();
            if !symbol.is_empty() {
                self.symbol = symbol.to_string();
            }
        }
        Ok(())
    }

    /// Reject indicator parameters the indicator functions would refuse.
    pub fn validate(&self) -> Result<()> {
        check_period("sma_period", self.sma_period).context("invalid sma_period")?;
        check_period("ema_period", self.ema_period).context("invalid ema_period")?;
        self.bollinger
            .validate()
            .context("invalid bollinger parameters")?;
        self.macd.validate().context("invalid macd parameters")?;
        if self.history_count == 0 {
            anyhow::bail!("history_count must be at least 1");
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.deriv.app_id, 1089);
        assert_eq!(cfg.deriv.endpoint, "ws.derivws.com");
        assert!(cfg.deriv.token.is_empty());
        assert_eq!(cfg.symbol, "R_100");
        assert_eq!(cfg.history_count, 100);
        assert_eq!(cfg.bollinger.period, 20);
        assert_eq!(cfg.macd, MacdParams::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "R_100");
        assert_eq!(cfg.sma_period, 5);
        assert_eq!(cfg.macd.slow_period, 26);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "frxEURUSD", "macd": { "fast_period": 8 }, "deriv": { "app_id": 42 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "frxEURUSD");
        assert_eq!(cfg.macd.fast_period, 8);
        assert_eq!(cfg.macd.slow_period, 26);
        assert_eq!(cfg.deriv.app_id, 42);
        assert_eq!(cfg.deriv.endpoint, "ws.derivws.com");
    }

    #[test]
    fn token_is_never_serialised_or_printed() {
        let mut cfg = RuntimeConfig::default();
        cfg.deriv.token = "a1-secret".into();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("a1-secret"));
        assert!(!format!("{cfg:?}").contains("a1-secret"));
    }

    #[test]
    fn env_overrides() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_vars(env(&[
            ("DERIV_APP_ID", " 31063 "),
            ("DERIV_TOKEN", "tok"),
            ("DERIV_ENDPOINT", "green.derivws.com"),
            ("DERIV_SYMBOL", "R_25"),
        ]))
        .unwrap();
        assert_eq!(cfg.deriv.app_id, 31063);
        assert_eq!(cfg.deriv.token, "tok");
        assert_eq!(cfg.deriv.endpoint, "green.derivws.com");
        assert_eq!(cfg.symbol, "R_25");
    }

    #[test]
    fn env_rejects_bad_app_id() {
        let mut cfg = RuntimeConfig::default();
        assert!(cfg.apply_vars(env(&[("DERIV_APP_ID", "abc")])).is_err());
    }

    #[test]
    fn validate_rejects_bad_indicator_params() {
        let mut cfg = RuntimeConfig::default();
        cfg.macd.signal_period = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.bollinger.multiplier = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.sma_period = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("deriv_ta_cfg_{}.json", std::process::id()));
        let mut cfg = RuntimeConfig::default();
        cfg.symbol = "R_75".into();
        cfg.bollinger.multiplier = 2.5;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbol, "R_75");
        assert!((loaded.bollinger.multiplier - 2.5).abs() < f64::EPSILON);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RuntimeConfig::load("/nonexistent/deriv_ta.json").is_err());
    }
}
