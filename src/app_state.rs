// =============================================================================
// Application State — ties registry, hub, manager and REST client together
// =============================================================================
//
// Handed to every axum handler as `Arc<AppState>`. The venue registry is
// immutable; the hub and the connection manager own their own locking.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::history::HistoryClient;
use crate::market_data::CandleHub;
use crate::runtime_config::GatewayConfig;
use crate::upstream::ConnectionManager;
use crate::venues::VenueRegistry;

pub struct AppState {
    pub config: GatewayConfig,
    pub registry: Arc<VenueRegistry>,
    pub hub: Arc<CandleHub>,
    pub manager: Arc<ConnectionManager>,
    pub history: HistoryClient,
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    /// Fails when the venue configuration is ambiguous or names an unknown
    /// venue; the gateway must not start in that case.
    pub fn new(config: GatewayConfig, shutdown: CancellationToken) -> Result<Self> {
        let registry = Arc::new(
            VenueRegistry::from_builtin(&config.venues, &config.endpoints)
                .context("invalid venue configuration")?,
        );
        let hub = Arc::new(CandleHub::new(config.subscriber_buffer));
        let manager = Arc::new(ConnectionManager::new(
            registry.clone(),
            hub.clone(),
            config.upstream_settings(),
            shutdown.child_token(),
        ));
        let history = HistoryClient::new(Duration::from_secs(10))?;

        Ok(Self {
            config,
            registry,
            hub,
            manager,
            history,
            shutdown,
            start_time: Instant::now(),
        })
    }

    /// Stop every upstream and close every subscriber queue.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.manager.shutdown();
        self.hub.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_venue_config_aborts() {
        let config = GatewayConfig {
            venues: vec!["binance".into(), "binance".into()],
            ..GatewayConfig::default()
        };
        let err = AppState::new(config, CancellationToken::new()).err().expect("must fail");
        assert!(format!("{err:#}").contains("duplicate venue id"));
    }

    #[test]
    fn unknown_venue_config_aborts() {
        let config = GatewayConfig {
            venues: vec!["binance".into(), "ftx".into()],
            ..GatewayConfig::default()
        };
        assert!(AppState::new(config, CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_hub() {
        let state = AppState::new(GatewayConfig::default(), CancellationToken::new()).unwrap();
        let (_id, mut rx) = state.hub.register(crate::market_data::SubscriberFilter::all(
            crate::types::MarketSelection::Spot,
        ));
        state.shutdown();
        assert!(rx.recv().await.is_none());
        assert!(state.shutdown.is_cancelled());
    }
}
