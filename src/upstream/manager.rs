// =============================================================================
// Upstream Connection Manager — at most one live task per (venue, market)
// =============================================================================
//
// The connection map is the only state the manager shares, and every add or
// remove goes through its mutex. Each entry tracks which subscribers need
// the key; the entry (and its task, including any pending backoff timer) is
// cancelled as soon as the last of them releases it.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::UpstreamUnit;
use super::state::UpstreamStatus;
use crate::error::GatewayError;
use crate::market_data::{CandleHub, SubscriberId};
use crate::types::{Interval, UpstreamKey};
use crate::venues::{SubscriptionParams, VenueRegistry};

/// Instrument used for a venue with no configured instrument.
const DEFAULT_INSTRUMENT: &str = "BTCUSDT";

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Fixed delay between a close/error and the next attempt.
    pub backoff: Duration,
    pub connect_timeout: Duration,
    pub interval: Interval,
    /// Venue id → venue-native instrument.
    pub instruments: HashMap<String, String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            interval: Interval::OneMinute,
            instruments: HashMap::new(),
        }
    }
}

impl UpstreamSettings {
    pub fn params_for(&self, venue: &str) -> SubscriptionParams {
        SubscriptionParams {
            instrument: self
                .instruments
                .get(venue)
                .cloned()
                .unwrap_or_else(|| DEFAULT_INSTRUMENT.to_string()),
            interval: self.interval,
        }
    }
}

struct UpstreamEntry {
    status: Arc<RwLock<UpstreamStatus>>,
    interested: HashSet<SubscriberId>,
    interest: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UpstreamEntry {
    fn sync_interest(&self) {
        self.interest.store(self.interested.len(), Ordering::Release);
    }
}

/// Status of one key plus how many subscribers hold it open.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSnapshot {
    #[serde(flatten)]
    pub status: UpstreamStatus,
    pub subscribers: usize,
}

pub struct ConnectionManager {
    registry: Arc<VenueRegistry>,
    hub: Arc<CandleHub>,
    settings: UpstreamSettings,
    connections: Mutex<HashMap<UpstreamKey, UpstreamEntry>>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<VenueRegistry>,
        hub: Arc<CandleHub>,
        settings: UpstreamSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            hub,
            settings,
            connections: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Record `subscriber`'s interest in `key` and make sure a task is
    /// running for it. A key that is connecting, streaming or waiting out
    /// its backoff is left alone.
    pub fn ensure_active(&self, key: &UpstreamKey, subscriber: SubscriberId) -> Result<(), GatewayError> {
        let adapter = self.registry.get_adapter(&key.venue)?;
        let url = adapter
            .endpoint(key.market)
            .ok_or_else(|| GatewayError::UnsupportedMarket {
                venue: key.venue.clone(),
                market: key.market,
            })?
            .to_string();

        let mut connections = self.connections.lock();

        let interested = match connections.remove(key) {
            Some(mut entry) => {
                entry.interested.insert(subscriber);
                entry.sync_interest();
                if !entry.task.is_finished() {
                    debug!(key = %key, subscribers = entry.interested.len(), "upstream already active");
                    connections.insert(key.clone(), entry);
                    return Ok(());
                }
                entry.interested
            }
            None => HashSet::from([subscriber]),
        };

        if self.shutdown.is_cancelled() {
            debug!(key = %key, "shutting down — not starting upstream");
            return Ok(());
        }

        let status = Arc::new(RwLock::new(UpstreamStatus::new(key)));
        let interest = Arc::new(AtomicUsize::new(interested.len()));
        let cancel = self.shutdown.child_token();
        let params = self.settings.params_for(&key.venue);

        let unit = UpstreamUnit {
            key: key.clone(),
            url,
            subscription: adapter.build_subscription(key.market, &params),
            adapter,
            hub: self.hub.clone(),
            status: status.clone(),
            interest: interest.clone(),
            cancel: cancel.clone(),
            backoff: self.settings.backoff,
            connect_timeout: self.settings.connect_timeout,
            last_timestamp: None,
        };
        let task = tokio::spawn(unit.run());
        info!(key = %key, instrument = %params.instrument, interval = %params.interval, "upstream started");

        connections.insert(
            key.clone(),
            UpstreamEntry {
                status,
                interested,
                interest,
                cancel,
                task,
            },
        );
        Ok(())
    }

    /// Drop `subscriber`'s interest in `key`; tears the key down when nobody
    /// is left.
    pub fn release(&self, key: &UpstreamKey, subscriber: SubscriberId) {
        let mut connections = self.connections.lock();
        let Some(entry) = connections.get_mut(key) else {
            return;
        };
        entry.interested.remove(&subscriber);
        entry.sync_interest();
        if entry.interested.is_empty() {
            if let Some(entry) = connections.remove(key) {
                entry.cancel.cancel();
                info!(key = %key, "last subscriber gone — upstream torn down");
            }
        }
    }

    /// Release every key `subscriber` holds.
    pub fn release_all(&self, subscriber: SubscriberId) {
        let keys: Vec<UpstreamKey> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, e)| e.interested.contains(&subscriber))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.release(&key, subscriber);
        }
    }

    #[cfg(test)]
    pub fn is_active(&self, key: &UpstreamKey) -> bool {
        self.connections.lock().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.connections.lock().len()
    }

    #[cfg(test)]
    pub fn subscribers_of(&self, key: &UpstreamKey) -> usize {
        self.connections
            .lock()
            .get(key)
            .map_or(0, |e| e.interested.len())
    }

    pub fn snapshot(&self) -> Vec<UpstreamSnapshot> {
        let mut out: Vec<UpstreamSnapshot> = self
            .connections
            .lock()
            .values()
            .map(|e| UpstreamSnapshot {
                status: e.status.read().clone(),
                subscribers: e.interested.len(),
            })
            .collect();
        out.sort_by(|a, b| (&a.status.venue, a.status.market).cmp(&(&b.status.venue, b.status.market)));
        out
    }

    /// Cancel every connection and backoff timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut connections = self.connections.lock();
        let count = connections.len();
        for (_, entry) in connections.drain() {
            entry.cancel.cancel();
        }
        info!(count, "connection manager shut down");
    }
}
