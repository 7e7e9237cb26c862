// =============================================================================
// Gateway Configuration — JSON file with serde defaults plus env overrides
// =============================================================================
//
// Every field carries `#[serde(default)]` so a partial (or empty) file still
// loads. Environment variables win over the file for the handful of knobs an
// operator usually changes per deployment.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Interval;
use crate::upstream::UpstreamSettings;
use crate::venues::registry::BUILTIN_VENUES;
use crate::venues::VenueEndpoints;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_venues() -> Vec<String> {
    BUILTIN_VENUES.iter().map(|v| v.to_string()).collect()
}

fn default_instruments() -> HashMap<String, String> {
    [
        ("binance", "btcusdt"),
        ("bybit", "BTCUSDT"),
        ("kraken", "XBT/USD"),
        ("kucoin", "BTC-USDT"),
    ]
    .into_iter()
    .map(|(venue, instrument)| (venue.to_string(), instrument.to_string()))
    .collect()
}

// =============================================================================
// GatewayConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Fixed delay between an upstream close/error and the next attempt.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Outbound queue depth per subscriber, in frames. Frames beyond it are
    /// dropped for that subscriber.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Kline interval subscribed on every upstream.
    #[serde(default)]
    pub interval: Interval,

    /// Venue id → venue-native instrument.
    #[serde(default = "default_instruments")]
    pub instruments: HashMap<String, String>,

    /// Venue id → streaming endpoint overrides.
    #[serde(default)]
    pub endpoints: HashMap<String, VenueEndpoints>,

    /// Enabled venue ids.
    #[serde(default = "default_venues")]
    pub venues: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            backoff_secs: default_backoff_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            interval: Interval::default(),
            instruments: default_instruments(),
            endpoints: HashMap::new(),
            venues: default_venues(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read gateway config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse gateway config from {}", path.display()))?;

        info!(
            path = %path.display(),
            venues = ?config.venues,
            interval = %config.interval,
            "gateway config loaded"
        );

        Ok(config)
    }

    /// Apply `GATEWAY_BIND_ADDR` and `GATEWAY_VENUES` overrides.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("GATEWAY_BIND_ADDR").filter(|a| !a.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(list) = lookup("GATEWAY_VENUES") {
            let venues: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !venues.is_empty() {
                self.venues = venues;
            }
        }
    }

    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            backoff: Duration::from_secs(self.backoff_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            interval: self.interval,
            instruments: self.instruments.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert_eq!(cfg.backoff_secs, 5);
        assert_eq!(cfg.interval, Interval::OneMinute);
        assert_eq!(cfg.venues.len(), 4);
        assert_eq!(cfg.instruments["kraken"], "XBT/USD");
        assert!(cfg.endpoints.is_empty());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.backoff_secs, 5);
        assert_eq!(cfg.subscriber_buffer, 256);
        assert_eq!(cfg.venues, default_venues());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "interval": "5m",
            "venues": ["binance"],
            "endpoints": { "binance": { "spot": "ws://127.0.0.1:9001" } }
        }"#;
        let cfg: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.interval, Interval::FiveMinutes);
        assert_eq!(cfg.venues, vec!["binance"]);
        assert_eq!(cfg.endpoints["binance"].spot.as_deref(), Some("ws://127.0.0.1:9001"));
        assert_eq!(cfg.endpoints["binance"].futures, None);
        assert_eq!(cfg.backoff_secs, 5);
    }

    #[test]
    fn bad_interval_is_rejected() {
        assert!(serde_json::from_str::<GatewayConfig>(r#"{ "interval": "3m" }"#).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_env_overrides(|key| match key {
            "GATEWAY_BIND_ADDR" => Some("127.0.0.1:8080".into()),
            "GATEWAY_VENUES" => Some(" Binance, kraken ,".into()),
            _ => None,
        });
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.venues, vec!["binance", "kraken"]);
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(GatewayConfig::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn upstream_settings_carry_backoff() {
        let cfg = GatewayConfig {
            backoff_secs: 2,
            ..GatewayConfig::default()
        };
        let settings = cfg.upstream_settings();
        assert_eq!(settings.backoff, Duration::from_secs(2));
        assert_eq!(settings.params_for("binance").instrument, "btcusdt");
    }
}
