use serde_json::{json, Value};

use super::{millis, number, SubscriptionParams, VenueAdapter, VenueEndpoints};
use crate::market_data::CanonicalCandle;
use crate::types::Market;

pub const ID: &str = "binance";

/// Binance spot and USD-M futures kline streams.
pub struct BinanceAdapter {
    endpoints: VenueEndpoints,
}

impl BinanceAdapter {
    pub fn default_endpoints() -> VenueEndpoints {
        VenueEndpoints::new(
            Some("wss://stream.binance.com:9443/ws"),
            Some("wss://fstream.binance.com/ws"),
        )
    }

    pub fn new(endpoints: VenueEndpoints) -> Self {
        Self { endpoints }
    }
}

impl VenueAdapter for BinanceAdapter {
    fn id(&self) -> &str {
        ID
    }

    fn endpoint(&self, market: Market) -> Option<&str> {
        self.endpoints.get(market)
    }

    fn build_subscription(&self, _market: Market, params: &SubscriptionParams) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@kline_{}", params.instrument.to_lowercase(), params.interval)],
            "id": 1,
        })
    }

    /// Accepts the raw single-stream payload `{ "e": "kline", "k": { ... } }`
    /// as well as the combined-stream envelope `{ "stream", "data": { ... } }`.
    fn parse(&self, market: Market, raw: &str) -> Option<CanonicalCandle> {
        let root: Value = serde_json::from_str(raw).ok()?;
        let data = root.get("data").unwrap_or(&root);
        let k = data.get("k")?;

        Some(CanonicalCandle {
            venue: ID.to_string(),
            market,
            timestamp: millis(k.get("t")?)?,
            open: number(k.get("o")?)?,
            high: number(k.get("h")?)?,
            low: number(k.get("l")?)?,
            close: number(k.get("c")?)?,
            volume: number(k.get("v")?)?,
        })
    }
}
