// =============================================================================
// History passthrough — one REST GET per request, venue JSON returned as-is
// =============================================================================
//
// The gateway does not backfill. This module only validates the
// (exchange, market, symbol, interval, limit) tuple, maps it onto the venue's
// REST endpoint and query naming, and relays the response body.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::GatewayError;
use crate::types::{Interval, Market};

/// Exchanges the HTTP route accepts.
pub const ROUTABLE_EXCHANGES: &[&str] = &["binance", "bybit", "mexc", "kucoin"];

const MAX_LIMIT: u32 = 1000;

/// Venue REST kline endpoints per market.
fn base_url(exchange: &str, market: Market) -> Option<&'static str> {
    let urls = match exchange {
        "binance" => ("https://api.binance.com/api/v3/klines", "https://fapi.binance.com/fapi/v1/klines"),
        "bybit" => ("https://api.bybit.com/v2/public/kline/list", "https://api.bybit.com/v2/public/kline/list"),
        "kucoin" => (
            "https://api.kucoin.com/api/v1/market/candles",
            "https://api-futures.kucoin.com/api/v1/kline/query",
        ),
        "mexc" => ("https://api.mexc.com/api/v3/klines", "https://contract.mexc.com/api/v1/contract/kline"),
        "coingecko" => (
            "https://api.coingecko.com/api/v3/coins/markets",
            "https://api.coingecko.com/api/v3/derivatives",
        ),
        "cryptocompare" => (
            "https://min-api.cryptocompare.com/data/v2/histoday",
            "https://min-api.cryptocompare.com/data/futures/histoday",
        ),
        "coinapi" => ("https://rest.coinapi.io/v1/ohlcv/", "https://rest.coinapi.io/v1/ohlcv/"),
        "kraken" => (
            "https://api.kraken.com/0/public/OHLC",
            "https://futures.kraken.com/derivatives/api/v3/tick",
        ),
        "bitfinex" => (
            "https://api-pub.bitfinex.com/v2/candles/trade:1m:",
            "https://api-pub.bitfinex.com/v2/candles/trade:1m:",
        ),
        _ => return None,
    };
    Some(match market {
        Market::Spot => urls.0,
        Market::Futures => urls.1,
    })
}

/// Raw query string of the history route.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub exchange: String,
    pub market: Market,
    pub symbol: String,
    pub interval: Interval,
    pub limit: u32,
}

impl HistoryRequest {
    pub fn validate(exchange: &str, market: &str, query: &HistoryQuery) -> Result<Self, GatewayError> {
        let exchange = exchange.to_lowercase();
        if !ROUTABLE_EXCHANGES.contains(&exchange.as_str()) {
            return Err(GatewayError::InvalidRequest(format!(
                "exchange must be one of [{}]",
                ROUTABLE_EXCHANGES.join(", ")
            )));
        }
        let market: Market = market.parse()?;

        let symbol = query
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest("symbol is required".to_string()))?
            .to_string();

        let interval: Interval = query
            .interval
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidRequest("interval is required".to_string()))?
            .parse()?;

        let limit: u32 = query
            .limit
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidRequest("limit is required".to_string()))?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| GatewayError::InvalidRequest(format!("limit must be an integer between 1 and {MAX_LIMIT}")))?;

        Ok(Self {
            exchange,
            market,
            symbol,
            interval,
            limit,
        })
    }

    pub fn url(&self) -> Result<Url, GatewayError> {
        passthrough_url(&self.exchange, self.market, &self.symbol, self.interval.as_str(), self.limit)
    }
}

/// Venue URL for a history request, with each venue's query naming.
pub fn passthrough_url(
    exchange: &str,
    market: Market,
    symbol: &str,
    interval: &str,
    limit: u32,
) -> Result<Url, GatewayError> {
    let exchange = exchange.to_lowercase();
    let base = base_url(&exchange, market).ok_or_else(|| GatewayError::UnknownVenue(exchange.clone()))?;

    let mut params: Vec<(&'static str, String)> = vec![
        ("symbol", symbol.to_string()),
        ("interval", interval.to_string()),
        ("limit", limit.to_string()),
    ];
    let mut url = base.to_string();
    match exchange.as_str() {
        "kucoin" => {
            remove_param(&mut params, "interval");
            params.push(("type", interval.to_string()));
        }
        "coingecko" => {
            remove_param(&mut params, "symbol");
            params.push(("vs_currency", "usd".to_string()));
        }
        "cryptocompare" => {
            let (fsym, tsym) = symbol.split_once('/').ok_or_else(|| {
                GatewayError::InvalidRequest(format!("cryptocompare symbol must look like BASE/QUOTE, got {symbol}"))
            })?;
            remove_param(&mut params, "symbol");
            params.push(("fsym", fsym.to_string()));
            params.push(("tsym", tsym.to_string()));
        }
        "coinapi" => {
            url.push_str(&format!("{symbol}/history"));
            remove_param(&mut params, "symbol");
            params.push(("period_id", interval.to_string()));
        }
        "kraken" => {
            remove_param(&mut params, "symbol");
            params.push(("pair", symbol.to_string()));
        }
        "bitfinex" => {
            url.push_str(&format!("{symbol}/hist"));
            remove_param(&mut params, "symbol");
        }
        _ => {}
    }

    Url::parse_with_params(&url, &params)
        .map_err(|e| GatewayError::InvalidRequest(format!("cannot build venue url: {e}")))
}

fn remove_param(params: &mut Vec<(&'static str, String)>, name: &str) {
    params.retain(|(k, _)| *k != name);
}

/// Thin REST client for the passthrough.
#[derive(Clone)]
pub struct HistoryClient {
    client: reqwest::Client,
}

impl HistoryClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build history http client")?;
        Ok(Self { client })
    }

    #[instrument(skip(self), name = "history::fetch")]
    pub async fn fetch(&self, req: &HistoryRequest) -> Result<serde_json::Value> {
        let url = req.url()?;
        info!(url = %url, "fetching market data");

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse response from {}", req.exchange))?;

        if !status.is_success() {
            anyhow::bail!("{} returned {}: {}", req.exchange, status, body);
        }

        debug!(exchange = %req.exchange, "market data fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(symbol: &str, interval: &str, limit: &str) -> HistoryQuery {
        HistoryQuery {
            symbol: Some(symbol.into()),
            interval: Some(interval.into()),
            limit: Some(limit.into()),
        }
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn validates_happy_path() {
        let req = HistoryRequest::validate("Binance", "futures", &query("BTCUSDT", "15m", "500")).unwrap();
        assert_eq!(req.exchange, "binance");
        assert_eq!(req.market, Market::Futures);
        assert_eq!(req.interval, Interval::FifteenMinutes);
        assert_eq!(req.limit, 500);
    }

    #[test]
    fn rejects_bad_tuples() {
        let ok = query("BTCUSDT", "1m", "10");
        assert!(HistoryRequest::validate("kraken", "spot", &ok).is_err());
        assert!(HistoryRequest::validate("binance", "margin", &ok).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &query("", "1m", "10")).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &query("BTCUSDT", "2m", "10")).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &query("BTCUSDT", "1m", "0")).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &query("BTCUSDT", "1m", "1001")).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &query("BTCUSDT", "1m", "ten")).is_err());
        assert!(HistoryRequest::validate("binance", "spot", &HistoryQuery::default()).is_err());
    }

    #[test]
    fn binance_keeps_common_params() {
        let url = passthrough_url("binance", Market::Spot, "BTCUSDT", "1h", 100).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.binance.com/api/v3/klines?symbol=BTCUSDT&interval=1h&limit=100"
        );
    }

    #[test]
    fn kucoin_uses_type_instead_of_interval() {
        let url = passthrough_url("kucoin", Market::Spot, "BTC-USDT", "1m", 10).unwrap();
        let p = pairs(&url);
        assert!(p.contains(&("type".into(), "1m".into())));
        assert!(!p.iter().any(|(k, _)| k == "interval"));
    }

    #[test]
    fn coinapi_appends_symbol_and_period() {
        let url = passthrough_url("coinapi", Market::Spot, "BITSTAMP_SPOT_BTC_USD", "1HRS", 5).unwrap();
        assert_eq!(url.path(), "/v1/ohlcv/BITSTAMP_SPOT_BTC_USD/history");
        let p = pairs(&url);
        assert!(p.contains(&("period_id".into(), "1HRS".into())));
        assert!(!p.iter().any(|(k, _)| k == "symbol"));
    }

    #[test]
    fn other_remappings() {
        let kraken = pairs(&passthrough_url("kraken", Market::Spot, "XBTUSD", "1m", 5).unwrap());
        assert!(kraken.contains(&("pair".into(), "XBTUSD".into())));

        let cc = pairs(&passthrough_url("cryptocompare", Market::Spot, "BTC/USD", "1d", 5).unwrap());
        assert!(cc.contains(&("fsym".into(), "BTC".into())));
        assert!(cc.contains(&("tsym".into(), "USD".into())));
        assert!(passthrough_url("cryptocompare", Market::Spot, "BTCUSD", "1d", 5).is_err());

        let gecko = pairs(&passthrough_url("coingecko", Market::Spot, "BTC", "1d", 5).unwrap());
        assert!(gecko.contains(&("vs_currency".into(), "usd".into())));

        let bfx = passthrough_url("bitfinex", Market::Spot, "tBTCUSD", "1m", 5).unwrap();
        assert!(bfx.path().ends_with("trade:1m:tBTCUSD/hist"));

        assert_eq!(
            passthrough_url("ftx", Market::Spot, "BTC", "1m", 5),
            Err(GatewayError::UnknownVenue("ftx".into()))
        );
    }
}
