use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Market, UpstreamKey};

/// Lifecycle of one upstream key.
///
/// `Disconnected → Connecting → Subscribing → Streaming → Backoff → Connecting ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
    Backoff,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// Observable status of one upstream connection. Written only by the
/// connection's own task.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub venue: String,
    pub market: Market,
    pub state: ConnectionState,
    /// Connection attempts since the last time the key reached `Streaming`.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub candles: u64,
    pub since: DateTime<Utc>,
}

impl UpstreamStatus {
    pub fn new(key: &UpstreamKey) -> Self {
        Self {
            venue: key.venue.clone(),
            market: key.market,
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_error: None,
            candles: 0,
            since: Utc::now(),
        }
    }

    pub fn transition(&mut self, next: ConnectionState) {
        match next {
            ConnectionState::Connecting => self.attempts += 1,
            ConnectionState::Streaming => self.attempts = 0,
            _ => {}
        }
        self.state = next;
        self.since = Utc::now();
    }
}
