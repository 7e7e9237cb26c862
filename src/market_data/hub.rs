// =============================================================================
// Candle Hub — fan-in from every upstream, fan-out to every subscriber
// =============================================================================
//
// Each subscriber owns a bounded mpsc queue whose only sender lives here.
// `publish` serialises the candle once and `try_send`s the frame to every
// matching subscriber while holding the subscriber map lock, so two publish
// calls are delivered to everyone in the same relative order. A full queue
// drops the frame for that subscriber only.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::candle::CanonicalCandle;
use crate::types::{Market, MarketSelection};

/// Opaque identity of one downstream subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a subscriber wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFilter {
    pub selection: MarketSelection,
    /// `None` means every venue.
    pub venues: Option<HashSet<String>>,
}

impl SubscriberFilter {
    pub fn all(selection: MarketSelection) -> Self {
        Self {
            selection,
            venues: None,
        }
    }

    pub fn matches(&self, venue: &str, market: Market) -> bool {
        self.selection.includes(market)
            && self.venues.as_ref().map_or(true, |v| v.contains(venue))
    }
}

struct SubscriberSlot {
    filter: SubscriberFilter,
    tx: mpsc::Sender<Arc<str>>,
    dropped: u64,
}

pub struct CandleHub {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberSlot>>,
    buffer: usize,
    published: AtomicU64,
    rejected: AtomicU64,
}

impl CandleHub {
    /// `buffer` is the per-subscriber queue depth in frames.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
            published: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Attach a subscriber and hand back the receiving half of its queue.
    pub fn register(&self, filter: SubscriberFilter) -> (SubscriberId, mpsc::Receiver<Arc<str>>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.lock().insert(
            id,
            SubscriberSlot {
                filter,
                tx,
                dropped: 0,
            },
        );
        info!(subscriber = %id, "subscriber attached to hub");
        (id, rx)
    }

    /// Replace the filter of an attached subscriber. Returns false when the
    /// subscriber is unknown.
    pub fn set_filter(&self, id: SubscriberId, filter: SubscriberFilter) -> bool {
        match self.subscribers.lock().get_mut(&id) {
            Some(slot) => {
                slot.filter = filter;
                true
            }
            None => false,
        }
    }

    pub fn deregister(&self, id: SubscriberId) {
        if let Some(slot) = self.subscribers.lock().remove(&id) {
            info!(subscriber = %id, dropped = slot.dropped, "subscriber detached from hub");
        }
    }

    /// Broadcast one candle. Malformed candles are dropped here. Returns the
    /// number of subscribers the frame was queued for.
    pub fn publish(&self, candle: &CanonicalCandle) -> usize {
        if !candle.is_well_formed() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                venue = %candle.venue,
                market = %candle.market,
                timestamp = candle.timestamp,
                "dropping candle that fails OHLC sanity check"
            );
            return 0;
        }

        let frame: Arc<str> = match serde_json::to_string(candle) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialise candle");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut subscribers = self.subscribers.lock();
        for (id, slot) in subscribers.iter_mut() {
            if !slot.filter.matches(&candle.venue, candle.market) {
                continue;
            }
            match slot.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    slot.dropped += 1;
                    debug!(subscriber = %id, dropped = slot.dropped, "subscriber queue full — frame dropped");
                }
                // Receiver gone; the gateway deregisters it on its way out.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Drop every subscriber queue. Gateway units see their receiver end and
    /// close their sockets.
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.lock();
        let count = subscribers.len();
        subscribers.clear();
        info!(count, "hub closed all subscriber queues");
    }
}
