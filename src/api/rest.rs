// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`; none require authentication.
//
//   GET /api/v1/health                        liveness + counters
//   GET /api/v1/upstreams                     per-key connection state
//   GET /api/v1/candles/:exchange/:market     historical candle passthrough
//   GET /ws, /api/v1/ws                       subscriber WebSocket
//
// CORS is configured permissively; browser dashboards connect directly.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::history::{HistoryQuery, HistoryRequest};
use crate::upstream::UpstreamSnapshot;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/upstreams", get(upstreams))
        .route("/api/v1/candles/:exchange/:market", get(candles))
        // ── WebSocket (handled in ws module but mounted here) ─────────
        .route("/ws", get(crate::api::ws::ws_handler))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    subscribers: usize,
    upstreams: usize,
    candles_published: u64,
    candles_rejected: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: if state.shutdown.is_cancelled() { "stopping" } else { "ok" },
        subscribers: state.hub.subscriber_count(),
        upstreams: state.manager.active_count(),
        candles_published: state.hub.published_count(),
        candles_rejected: state.hub.rejected_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Upstreams
// =============================================================================

#[derive(Serialize)]
struct UpstreamsResponse {
    venues: Vec<String>,
    connections: Vec<UpstreamSnapshot>,
}

async fn upstreams(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(UpstreamsResponse {
        venues: state.registry.ids().map(str::to_string).collect(),
        connections: state.manager.snapshot(),
    })
}

// =============================================================================
// Historical candles (REST passthrough)
// =============================================================================

async fn candles(
    State(state): State<Arc<AppState>>,
    Path((exchange, market)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let request = HistoryRequest::validate(&exchange, &market, &query).map_err(|e| {
        warn!(exchange = %exchange, market = %market, error = %e, "rejected history request");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": e.to_string(), "error": true })),
        )
    })?;

    match state.history.fetch(&request).await {
        Ok(data) => Ok(Json(json!({
            "data": data,
            "message": "Crypto data fetched successfully",
            "error": false,
        }))),
        Err(e) => {
            error!(exchange = %request.exchange, error = %e, "history upstream failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "message": format!("Failed to fetch data from {}: {e:#}", request.exchange),
                    "error": true,
                })),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::runtime_config::GatewayConfig;

    fn test_router() -> Router {
        let state = AppState::new(GatewayConfig::default(), CancellationToken::new()).unwrap();
        router(Arc::new(state))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let (status, body) = get_json(test_router(), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["subscribers"], 0);
        assert_eq!(body["upstreams"], 0);
        assert!(body["server_time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn upstreams_lists_registered_venues() {
        let (status, body) = get_json(test_router(), "/api/v1/upstreams").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["venues"],
            json!(["binance", "bybit", "kraken", "kucoin"])
        );
        assert_eq!(body["connections"], json!([]));
    }

    #[tokio::test]
    async fn history_rejects_unroutable_exchange() {
        let (status, body) =
            get_json(test_router(), "/api/v1/candles/ftx/spot?symbol=BTCUSDT&interval=1m").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert!(body["message"].as_str().unwrap().starts_with("exchange must be one of"));
    }

    #[tokio::test]
    async fn history_rejects_bad_market_and_limit() {
        let (status, body) =
            get_json(test_router(), "/api/v1/candles/binance/options?symbol=BTCUSDT").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("invalid market type"));

        let (status, _) = get_json(
            test_router(),
            "/api/v1/candles/binance/spot?symbol=BTCUSDT&interval=1m&limit=5000",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
