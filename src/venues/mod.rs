// =============================================================================
// Venue adapters — one fixed capability set per exchange
// =============================================================================
//
// Every venue speaks its own handshake and frame shape. An adapter turns the
// canonical subscription parameters into the venue handshake and turns one
// raw inbound frame into a `CanonicalCandle`, or `None` for anything that is
// not a candle (acks, heartbeats, errors, garbage). Adapters are immutable
// and shared by every connection.
// =============================================================================

pub mod binance;
pub mod bybit;
pub mod kraken;
pub mod kucoin;
pub mod registry;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::market_data::CanonicalCandle;
use crate::types::{Interval, Market};

pub use registry::VenueRegistry;

/// Parameters the handshake is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParams {
    /// Venue-native instrument identifier (`btcusdt`, `XBT/USD`, ...).
    pub instrument: String,
    pub interval: Interval,
}

/// Application-level ping some venues require to keep a socket open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub every: Duration,
    pub payload: &'static str,
}

/// Streaming endpoints of a venue per market. `None` = market not offered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEndpoints {
    #[serde(default)]
    pub spot: Option<String>,
    #[serde(default)]
    pub futures: Option<String>,
}

impl VenueEndpoints {
    pub fn new(spot: Option<&str>, futures: Option<&str>) -> Self {
        Self {
            spot: spot.map(str::to_string),
            futures: futures.map(str::to_string),
        }
    }

    pub fn get(&self, market: Market) -> Option<&str> {
        match market {
            Market::Spot => self.spot.as_deref(),
            Market::Futures => self.futures.as_deref(),
        }
    }

    /// Fields set in `overrides` win.
    pub fn merged(mut self, overrides: &VenueEndpoints) -> Self {
        if let Some(spot) = &overrides.spot {
            self.spot = Some(spot.clone());
        }
        if let Some(futures) = &overrides.futures {
            self.futures = Some(futures.clone());
        }
        self
    }
}

pub trait VenueAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn endpoint(&self, market: Market) -> Option<&str>;

    /// The handshake message sent right after the socket opens.
    fn build_subscription(&self, market: Market, params: &SubscriptionParams) -> Value;

    /// Never fails: anything that is not a well-shaped candle yields `None`.
    fn parse(&self, market: Market, raw: &str) -> Option<CanonicalCandle>;

    fn keepalive(&self) -> Option<Keepalive> {
        None
    }

    fn supports(&self, market: Market) -> bool {
        self.endpoint(market).is_some()
    }
}

// ---------------------------------------------------------------------------
// Field extraction helpers
// ---------------------------------------------------------------------------

/// Venues send prices either as JSON strings or numbers.
pub(crate) fn number(val: &Value) -> Option<f64> {
    let n = match val {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Integer epoch milliseconds, as number or numeric string.
pub(crate) fn millis(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Epoch seconds (possibly fractional) converted to milliseconds. Negative
/// or out-of-range values yield `None` instead of saturating.
pub(crate) fn seconds_as_millis(val: &Value) -> Option<i64> {
    let secs = number(val)?;
    if !(0.0..=MAX_EPOCH_SECS).contains(&secs) {
        return None;
    }
    Some((secs * 1000.0).round() as i64)
}

const MAX_EPOCH_SECS: f64 = (i64::MAX / 1000) as f64;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_accepts_strings_and_numbers() {
        assert_eq!(number(&json!("100.5")), Some(100.5));
        assert_eq!(number(&json!(7)), Some(7.0));
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!(["1"])), None);
    }

    #[test]
    fn time_helpers() {
        assert_eq!(millis(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(millis(&json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(millis(&json!(1.5)), None);
        assert_eq!(seconds_as_millis(&json!("1542057360.435743")), Some(1_542_057_360_436));
        assert_eq!(seconds_as_millis(&json!("-1e300")), None);
        assert_eq!(seconds_as_millis(&json!(-1)), None);
        assert_eq!(seconds_as_millis(&json!("1e300")), None);
    }

    #[test]
    fn endpoint_overrides_merge_field_by_field() {
        let base = VenueEndpoints::new(Some("wss://a"), Some("wss://b"));
        let merged = base.merged(&VenueEndpoints::new(None, Some("ws://mock")));
        assert_eq!(merged.get(Market::Spot), Some("wss://a"));
        assert_eq!(merged.get(Market::Futures), Some("ws://mock"));
    }
}
