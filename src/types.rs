// =============================================================================
// Shared types used across the candle gateway
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Trading market segment a venue stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spot,
    Futures,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Spot, Market::Futures];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Futures => "futures",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Market {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot" => Ok(Self::Spot),
            "futures" => Ok(Self::Futures),
            other => Err(GatewayError::InvalidRequest(format!(
                "invalid market type: {other}. Allowed values: 'spot', 'futures'"
            ))),
        }
    }
}

/// Market class a subscriber asked for in its control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSelection {
    Spot,
    Futures,
    Both,
}

impl MarketSelection {
    pub fn includes(&self, market: Market) -> bool {
        matches!(
            (self, market),
            (Self::Both, _) | (Self::Spot, Market::Spot) | (Self::Futures, Market::Futures)
        )
    }

    pub fn markets(&self) -> &'static [Market] {
        match self {
            Self::Spot => &[Market::Spot],
            Self::Futures => &[Market::Futures],
            Self::Both => &Market::ALL,
        }
    }
}

/// Kline interval in canonical notation (`1m`, `5m`, ...). Each venue adapter
/// maps it onto its own naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::OneHour => 60,
            Self::FourHours => 240,
            Self::OneDay => 1440,
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::OneMinute
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Interval {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            other => Err(GatewayError::UnknownInterval(other.to_string())),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

/// Identifies one upstream stream: a venue and one of its markets.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize)]
pub struct UpstreamKey {
    pub venue: String,
    pub market: Market,
}

impl UpstreamKey {
    pub fn new(venue: impl Into<String>, market: Market) -> Self {
        Self {
            venue: venue.into(),
            market,
        }
    }
}

impl std::fmt::Display for UpstreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.venue, self.market)
    }
}
