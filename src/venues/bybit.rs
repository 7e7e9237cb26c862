use std::time::Duration;

use serde_json::{json, Value};

use super::{millis, number, Keepalive, SubscriptionParams, VenueAdapter, VenueEndpoints};
use crate::market_data::CanonicalCandle;
use crate::types::{Interval, Market};

pub const ID: &str = "bybit";

/// Bybit v5 public kline topics (spot and linear perpetuals).
pub struct BybitAdapter {
    endpoints: VenueEndpoints,
}

impl BybitAdapter {
    pub fn default_endpoints() -> VenueEndpoints {
        VenueEndpoints::new(
            Some("wss://stream.bybit.com/v5/public/spot"),
            Some("wss://stream.bybit.com/v5/public/linear"),
        )
    }

    pub fn new(endpoints: VenueEndpoints) -> Self {
        Self { endpoints }
    }

    /// Bybit names intervals in minutes, except daily which is `D`.
    fn interval_code(interval: Interval) -> String {
        match interval {
            Interval::OneDay => "D".to_string(),
            other => other.minutes().to_string(),
        }
    }
}

impl VenueAdapter for BybitAdapter {
    fn id(&self) -> &str {
        ID
    }

    fn endpoint(&self, market: Market) -> Option<&str> {
        self.endpoints.get(market)
    }

    fn build_subscription(&self, _market: Market, params: &SubscriptionParams) -> Value {
        json!({
            "op": "subscribe",
            "args": [format!(
                "kline.{}.{}",
                Self::interval_code(params.interval),
                params.instrument.to_uppercase()
            )],
        })
    }

    /// `{ "topic": "kline.1.BTCUSDT", "data": [ { start, open, ... } ] }`.
    /// A frame may carry several bars; the newest one is taken.
    fn parse(&self, market: Market, raw: &str) -> Option<CanonicalCandle> {
        let root: Value = serde_json::from_str(raw).ok()?;
        if !root.get("topic")?.as_str()?.starts_with("kline.") {
            return None;
        }
        let bar = root.get("data")?.as_array()?.last()?;

        Some(CanonicalCandle {
            venue: ID.to_string(),
            market,
            timestamp: millis(bar.get("start")?)?,
            open: number(bar.get("open")?)?,
            high: number(bar.get("high")?)?,
            low: number(bar.get("low")?)?,
            close: number(bar.get("close")?)?,
            volume: number(bar.get("volume")?)?,
        })
    }

    fn keepalive(&self) -> Option<Keepalive> {
        Some(Keepalive {
            every: Duration::from_secs(20),
            payload: r#"{"op":"ping"}"#,
        })
    }
}
