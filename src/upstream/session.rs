// =============================================================================
// Upstream session — one task per (venue, market) key
// =============================================================================
//
// Connects, sends the adapter's handshake, streams frames through the
// adapter parser into the hub, and on any close or transport error parks in
// Backoff for a fixed delay before reconnecting. Runs until its cancellation
// token fires or, after a close, nobody is interested in the key any more.
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{ConnectionState, UpstreamStatus};
use crate::market_data::CandleHub;
use crate::types::UpstreamKey;
use crate::venues::VenueAdapter;

pub(crate) struct UpstreamUnit {
    pub key: UpstreamKey,
    pub url: String,
    pub adapter: Arc<dyn VenueAdapter>,
    pub subscription: Value,
    pub hub: Arc<CandleHub>,
    pub status: Arc<RwLock<UpstreamStatus>>,
    /// Number of subscribers interested in this key, kept by the manager.
    pub interest: Arc<AtomicUsize>,
    pub cancel: CancellationToken,
    pub backoff: Duration,
    pub connect_timeout: Duration,
    /// Timestamp of the last candle handed to the hub for this key.
    pub last_timestamp: Option<i64>,
}

impl UpstreamUnit {
    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();

        loop {
            self.set_state(ConnectionState::Connecting);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.stream_once() => res,
            };

            match outcome {
                Ok(()) => {
                    warn!(key = %self.key, "upstream closed");
                }
                Err(e) => {
                    warn!(key = %self.key, error = %format!("{e:#}"), "upstream error");
                    self.status.write().last_error = Some(format!("{e:#}"));
                }
            }

            if self.interest.load(Ordering::Acquire) == 0 {
                info!(key = %self.key, "no subscribers left — not reconnecting");
                break;
            }

            self.set_state(ConnectionState::Backoff);
            warn!(
                key = %self.key,
                delay_ms = self.backoff.as_millis() as u64,
                "reconnecting after backoff"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(key = %self.key, "upstream task finished");
    }

    /// One connection lifetime. `Ok` means the venue closed the stream.
    async fn stream_once(&mut self) -> Result<()> {
        info!(key = %self.key, url = %self.url, "connecting to upstream");

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .context("upstream connect timed out")?
                .context("failed to connect to upstream")?;

        self.set_state(ConnectionState::Subscribing);
        let (mut write, mut read) = ws_stream.split();
        write
            .send(Message::Text(self.subscription.to_string()))
            .await
            .context("failed to send subscription")?;

        self.set_state(ConnectionState::Streaming);
        info!(key = %self.key, "upstream streaming");

        let keepalive = self.adapter.keepalive();
        let mut ticker = keepalive.map(|k| interval_at(Instant::now() + k.every, k.every));

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_frame(text),
                        Err(_) => debug!(key = %self.key, "ignoring non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(key = %self.key, frame = ?frame, "close frame received");
                        return Ok(());
                    }
                    // Ping/Pong: tungstenite answers pings itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("upstream read error"),
                    None => return Ok(()),
                },
                _ = next_tick(&mut ticker) => {
                    if let Some(k) = keepalive {
                        write
                            .send(Message::Text(k.payload.to_string()))
                            .await
                            .context("failed to send keepalive")?;
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let Some(candle) = self.adapter.parse(self.key.market, text) else {
            debug!(key = %self.key, len = text.len(), "frame is not a candle");
            return;
        };

        if let Some(last) = self.last_timestamp {
            if candle.timestamp < last {
                debug!(
                    key = %self.key,
                    timestamp = candle.timestamp,
                    last,
                    "dropping out-of-order candle"
                );
                return;
            }
        }
        if candle.is_well_formed() {
            self.last_timestamp = Some(candle.timestamp);
            self.status.write().candles += 1;
        }
        self.hub.publish(&candle);
    }

    fn set_state(&self, next: ConnectionState) {
        self.status.write().transition(next);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
