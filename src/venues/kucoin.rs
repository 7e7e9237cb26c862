use std::time::Duration;

use serde_json::{json, Value};

use super::{number, seconds_as_millis, Keepalive, SubscriptionParams, VenueAdapter, VenueEndpoints};
use crate::market_data::CanonicalCandle;
use crate::types::{Interval, Market};

pub const ID: &str = "kucoin";

/// KuCoin spot candle topic.
pub struct KucoinAdapter {
    endpoints: VenueEndpoints,
}

impl KucoinAdapter {
    pub fn default_endpoints() -> VenueEndpoints {
        VenueEndpoints::new(Some("wss://ws-api.kucoin.com/endpoint"), None)
    }

    pub fn new(endpoints: VenueEndpoints) -> Self {
        Self { endpoints }
    }

    /// KuCoin's `type` naming for candle intervals.
    pub fn interval_code(interval: Interval) -> &'static str {
        match interval {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::OneHour => "1hour",
            Interval::FourHours => "4hour",
            Interval::OneDay => "1day",
        }
    }
}

impl VenueAdapter for KucoinAdapter {
    fn id(&self) -> &str {
        ID
    }

    fn endpoint(&self, market: Market) -> Option<&str> {
        self.endpoints.get(market)
    }

    fn build_subscription(&self, _market: Market, params: &SubscriptionParams) -> Value {
        json!({
            "type": "subscribe",
            "topic": format!(
                "/market/candles:{}_{}",
                params.instrument.to_uppercase(),
                Self::interval_code(params.interval)
            ),
            "privateChannel": false,
            "response": true,
        })
    }

    /// `data.candles` is `[start(s), open, close, high, low, volume, turnover]`.
    fn parse(&self, market: Market, raw: &str) -> Option<CanonicalCandle> {
        let root: Value = serde_json::from_str(raw).ok()?;
        if root.get("type")?.as_str()? != "message" {
            return None;
        }
        let bar = root.get("data")?.get("candles")?.as_array()?;

        Some(CanonicalCandle {
            venue: ID.to_string(),
            market,
            timestamp: seconds_as_millis(bar.first()?)?,
            open: number(bar.get(1)?)?,
            close: number(bar.get(2)?)?,
            high: number(bar.get(3)?)?,
            low: number(bar.get(4)?)?,
            volume: number(bar.get(5)?)?,
        })
    }

    fn keepalive(&self) -> Option<Keepalive> {
        Some(Keepalive {
            every: Duration::from_secs(18),
            payload: r#"{"type":"ping"}"#,
        })
    }
}
