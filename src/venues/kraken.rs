use serde_json::{json, Value};

use super::{number, seconds_as_millis, SubscriptionParams, VenueAdapter, VenueEndpoints};
use crate::market_data::CanonicalCandle;
use crate::types::Market;

pub const ID: &str = "kraken";

/// Kraken public websocket (v1) OHLC channel. Spot only.
pub struct KrakenAdapter {
    endpoints: VenueEndpoints,
}

impl KrakenAdapter {
    pub fn default_endpoints() -> VenueEndpoints {
        VenueEndpoints::new(Some("wss://ws.kraken.com"), None)
    }

    pub fn new(endpoints: VenueEndpoints) -> Self {
        Self { endpoints }
    }
}

impl VenueAdapter for KrakenAdapter {
    fn id(&self) -> &str {
        ID
    }

    fn endpoint(&self, market: Market) -> Option<&str> {
        self.endpoints.get(market)
    }

    fn build_subscription(&self, _market: Market, params: &SubscriptionParams) -> Value {
        json!({
            "event": "subscribe",
            "pair": [params.instrument],
            "subscription": { "name": "ohlc", "interval": params.interval.minutes() },
        })
    }

    /// Channel frames are arrays:
    /// `[channelID, [time, etime, open, high, low, close, vwap, volume, count], "ohlc-<min>", pair]`.
    /// Only `etime` (end of the bar) is stable, so the open time is derived
    /// from it and the interval encoded in the channel name.
    fn parse(&self, market: Market, raw: &str) -> Option<CanonicalCandle> {
        let root: Value = serde_json::from_str(raw).ok()?;
        let frame = root.as_array()?;
        let minutes: i64 = frame
            .get(2)?
            .as_str()?
            .strip_prefix("ohlc-")?
            .parse()
            .ok()
            .filter(|m: &i64| *m > 0)?;
        let bar = frame.get(1)?.as_array()?;
        let end_ms = seconds_as_millis(bar.get(1)?)?;
        let timestamp = minutes
            .checked_mul(60_000)
            .and_then(|span| end_ms.checked_sub(span))?;

        Some(CanonicalCandle {
            venue: ID.to_string(),
            market,
            timestamp,
            open: number(bar.get(2)?)?,
            high: number(bar.get(3)?)?,
            low: number(bar.get(4)?)?,
            close: number(bar.get(5)?)?,
            volume: number(bar.get(7)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interval;

    fn adapter() -> KrakenAdapter {
        KrakenAdapter::new(KrakenAdapter::default_endpoints())
    }

    #[test]
    fn subscription_matches_kraken_handshake() {
        let params = SubscriptionParams {
            instrument: "XBT/USD".into(),
            interval: Interval::OneMinute,
        };
        assert_eq!(
            adapter().build_subscription(Market::Spot, &params),
            json!({
                "event": "subscribe",
                "pair": ["XBT/USD"],
                "subscription": { "name": "ohlc", "interval": 1 }
            })
        );
    }

    #[test]
    fn spot_only() {
        assert!(adapter().supports(Market::Spot));
        assert!(!adapter().supports(Market::Futures));
    }

    #[test]
    fn parses_ohlc_array() {
        let raw = r#"[42,["1542057314.748456","1542057360.000000","3586.70000","3586.70000",
            "3586.60000","3586.60000","3586.68894","0.03373000",2],"ohlc-1","XBT/USD"]"#;
        let candle = adapter().parse(Market::Spot, raw).expect("candle");
        assert_eq!(candle.timestamp, 1_542_057_300_000);
        assert!((candle.open - 3586.7).abs() < 1e-9);
        assert!((candle.volume - 0.03373).abs() < 1e-12);
    }

    #[test]
    fn events_and_malformed_arrays_yield_none() {
        let a = adapter();
        for raw in [
            r#"{"event":"heartbeat"}"#,
            r#"{"event":"systemStatus","status":"online","version":"1.9.0"}"#,
            r#"{"channelID":42,"event":"subscriptionStatus","status":"subscribed"}"#,
            r#"[42,["1","2","3"],"ohlc-1","XBT/USD"]"#,
            r#"[42,["1","2","a","b","c","d","e","f",1],"ohlc-1","XBT/USD"]"#,
            r#"[42,[["1","2"]],"trade","XBT/USD"]"#,
            r#"[42,"x","ohlc-x","XBT/USD"]"#,
            r#"[42,["1542057314.7","1542057360.0","1","1","1","1","1","1",2],"ohlc-999999999999999999","XBT/USD"]"#,
            r#"[42,["1542057314.7","1542057360.0","1","1","1","1","1","1",2],"ohlc-0","XBT/USD"]"#,
            r#"[42,["1542057314.7","-1e300","1","1","1","1","1","1",2],"ohlc-1","XBT/USD"]"#,
            r#"[]"#,
            "null",
        ] {
            assert!(a.parse(Market::Spot, raw).is_none(), "parsed: {raw}");
        }
    }
}
