use serde::{Deserialize, Serialize};

use crate::types::Market;

// ---------------------------------------------------------------------------
// Canonical candle
// ---------------------------------------------------------------------------

/// A single OHLCV candle normalised from any venue's kline stream.
///
/// Serialises to the downstream wire shape:
/// `{ exchange, market, timestamp, open, high, low, close, volume }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCandle {
    #[serde(rename = "exchange")]
    pub venue: String,
    pub market: Market,
    /// Candle open time, epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CanonicalCandle {
    /// True when every price and the volume are finite and non-negative and
    /// the high/low bracket the other prices.
    pub fn is_well_formed(&self) -> bool {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return false;
        }
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> CanonicalCandle {
        CanonicalCandle {
            venue: "binance".into(),
            market: Market::Spot,
            timestamp: 1_700_000_000_000,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn accepts_consistent_bar() {
        assert!(candle(100.5, 101.0, 100.0, 100.8, 12.3).is_well_formed());
        // Flat bar with zero volume is still valid.
        assert!(candle(5.0, 5.0, 5.0, 5.0, 0.0).is_well_formed());
    }

    #[test]
    fn rejects_high_below_body() {
        assert!(!candle(100.0, 99.0, 98.0, 100.5, 1.0).is_well_formed());
    }

    #[test]
    fn rejects_low_above_body() {
        assert!(!candle(100.0, 102.0, 100.5, 101.0, 1.0).is_well_formed());
    }

    #[test]
    fn rejects_negative_or_non_finite() {
        assert!(!candle(1.0, 2.0, 0.5, 1.5, -0.1).is_well_formed());
        assert!(!candle(f64::NAN, 2.0, 0.5, 1.5, 1.0).is_well_formed());
        assert!(!candle(1.0, f64::INFINITY, 0.5, 1.5, 1.0).is_well_formed());
    }

    #[test]
    fn serialises_with_exchange_field() {
        let json = serde_json::to_value(candle(100.5, 101.0, 100.0, 100.8, 12.3)).unwrap();
        assert_eq!(json["exchange"], "binance");
        assert_eq!(json["market"], "spot");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
        assert!(json.get("venue").is_none());
    }
}
