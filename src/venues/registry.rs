// =============================================================================
// Venue Registry — static catalog of adapters, built once at startup
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use super::binance::{self, BinanceAdapter};
use super::bybit::{self, BybitAdapter};
use super::kraken::{self, KrakenAdapter};
use super::kucoin::{self, KucoinAdapter};
use super::{VenueAdapter, VenueEndpoints};
use crate::error::GatewayError;
use crate::types::{MarketSelection, UpstreamKey};

/// Venue ids compiled into the gateway.
pub const BUILTIN_VENUES: &[&str] = &[binance::ID, bybit::ID, kraken::ID, kucoin::ID];

fn builtin_adapter(id: &str, overrides: Option<&VenueEndpoints>) -> Option<Arc<dyn VenueAdapter>> {
    let endpoints = |defaults: VenueEndpoints| match overrides {
        Some(o) => defaults.merged(o),
        None => defaults,
    };
    let adapter: Arc<dyn VenueAdapter> = match id {
        binance::ID => Arc::new(BinanceAdapter::new(endpoints(BinanceAdapter::default_endpoints()))),
        bybit::ID => Arc::new(BybitAdapter::new(endpoints(BybitAdapter::default_endpoints()))),
        kraken::ID => Arc::new(KrakenAdapter::new(endpoints(KrakenAdapter::default_endpoints()))),
        kucoin::ID => Arc::new(KucoinAdapter::new(endpoints(KucoinAdapter::default_endpoints()))),
        _ => return None,
    };
    Some(adapter)
}

pub struct VenueRegistry {
    adapters: BTreeMap<String, Arc<dyn VenueAdapter>>,
}

impl std::fmt::Debug for VenueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRegistry")
            .field("venues", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VenueRegistry {
    /// Fails on duplicate ids rather than letting one adapter shadow another.
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>) -> Result<Self, GatewayError> {
        let mut map = BTreeMap::new();
        for adapter in adapters {
            let id = adapter.id().to_string();
            if map.insert(id.clone(), adapter).is_some() {
                return Err(GatewayError::DuplicateVenue(id));
            }
        }
        Ok(Self { adapters: map })
    }

    /// Build the enabled built-in adapters with their endpoint overrides.
    pub fn from_builtin(
        enabled: &[String],
        endpoint_overrides: &HashMap<String, VenueEndpoints>,
    ) -> Result<Self, GatewayError> {
        if let Some(unknown) = endpoint_overrides
            .keys()
            .find(|id| !BUILTIN_VENUES.contains(&id.as_str()))
        {
            return Err(GatewayError::UnknownVenue(unknown.clone()));
        }

        let adapters = enabled
            .iter()
            .map(|id| {
                builtin_adapter(id, endpoint_overrides.get(id))
                    .ok_or_else(|| GatewayError::UnknownVenue(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let registry = Self::new(adapters)?;
        info!(venues = ?registry.ids().collect::<Vec<_>>(), "venue registry built");
        Ok(registry)
    }

    pub fn get_adapter(&self, venue: &str) -> Result<Arc<dyn VenueAdapter>, GatewayError> {
        self.adapters
            .get(venue)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownVenue(venue.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Upstream keys a subscriber with this selection depends on.
    ///
    /// With no venue set, every venue offering a selected market is used.
    /// With an explicit set, each venue must exist and offer at least one of
    /// the selected markets.
    pub fn keys_for(
        &self,
        selection: MarketSelection,
        venues: Option<&HashSet<String>>,
    ) -> Result<Vec<UpstreamKey>, GatewayError> {
        let mut keys = Vec::new();
        match venues {
            None => {
                for (id, adapter) in &self.adapters {
                    for market in selection.markets() {
                        if adapter.supports(*market) {
                            keys.push(UpstreamKey::new(id.clone(), *market));
                        }
                    }
                }
            }
            Some(requested) => {
                let mut requested: Vec<&String> = requested.iter().collect();
                requested.sort();
                for id in requested {
                    let adapter = self.get_adapter(id)?;
                    let before = keys.len();
                    for market in selection.markets() {
                        if adapter.supports(*market) {
                            keys.push(UpstreamKey::new(id.clone(), *market));
                        }
                    }
                    if keys.len() == before {
                        return Err(GatewayError::UnsupportedMarket {
                            venue: id.clone(),
                            market: selection.markets()[0],
                        });
                    }
                }
            }
        }
        Ok(keys)
    }
}
