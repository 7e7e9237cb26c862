// =============================================================================
// Candle Gateway — Main Entry Point
// =============================================================================
//
// Fans normalised OHLCV candles from several exchange WebSocket feeds out to
// any number of downstream WebSocket subscribers. Upstream connections are
// opened on demand, shared between subscribers and closed when the last
// subscriber interested in them leaves.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod error;
mod history;
mod market_data;
mod runtime_config;
mod types;
mod upstream;
mod venues;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::GatewayConfig;

const DEFAULT_CONFIG_PATH: &str = "gateway_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Candle Gateway — Starting Up                     ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = GatewayConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(path = %config_path, error = %e, "Failed to load config, using defaults");
        GatewayConfig::default()
    });
    config.apply_env_overrides(|key| std::env::var(key).ok());

    info!(
        venues = ?config.venues,
        interval = %config.interval,
        backoff_secs = config.backoff_secs,
        "Gateway configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    // A bad venue configuration aborts startup here.
    let shutdown = CancellationToken::new();
    let state = match AppState::new(config, shutdown.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Invalid gateway configuration — aborting startup");
            return Err(e);
        }
    };

    // ── 3. Start the API server ──────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    let signal_state = state.clone();

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            warn!("Shutdown signal received — stopping gracefully");
            signal_state.shutdown();
        })
        .await
        .context("API server failed")?;

    info!(
        published = state.hub.published_count(),
        rejected = state.hub.rejected_count(),
        "Candle Gateway shut down complete."
    );
    Ok(())
}
