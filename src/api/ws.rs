// =============================================================================
// Subscriber Gateway — downstream WebSocket
// =============================================================================
//
// Clients connect to `/ws` and send a control frame:
//
//   { "market": "spot" | "futures" | "both", "exchanges": ["binance", ...] }
//
// `exchanges` is optional (all venues offering the market). The first valid
// frame attaches the connection to the hub; later frames change what it
// receives. Every upstream key the selection needs is ensured active and
// keys it no longer needs are released. Invalid frames get
// `{ "error": "<reason>" }` back and change nothing.
//
// Thereafter the client receives one JSON candle per frame:
//   { exchange, market, timestamp, open, high, low, close, volume }
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::market_data::{SubscriberFilter, SubscriberId};
use crate::types::{MarketSelection, UpstreamKey};

#[derive(Debug, Deserialize)]
struct ControlFrame {
    market: MarketSelection,
    #[serde(default)]
    exchanges: Option<Vec<String>>,
}

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

/// Hub registration of one connection plus the upstream keys it holds.
struct Subscription {
    id: SubscriberId,
    frames: mpsc::Receiver<Arc<str>>,
    keys: Vec<UpstreamKey>,
}

enum Event {
    Outbound(Option<Arc<str>>),
    Inbound(Option<Result<Message, axum::Error>>),
}

async fn handle_subscriber(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription: Option<Subscription> = None;
    debug!("subscriber connected");

    loop {
        let event = tokio::select! {
            frame = next_outbound(&mut subscription) => Event::Outbound(frame),
            msg = receiver.next() => Event::Inbound(msg),
        };

        match event {
            Event::Outbound(Some(frame)) => {
                if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                    debug!(error = %e, "subscriber send failed — disconnecting");
                    break;
                }
            }
            Event::Outbound(None) => {
                info!("hub closed subscriber queue — closing connection");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            Event::Inbound(Some(Ok(Message::Text(text)))) => {
                if let Err(e) = apply_control(&state, &text, &mut subscription) {
                    warn!(error = %e, "rejected control frame");
                    let reply = serde_json::json!({ "error": e.to_string() }).to_string();
                    if sender.send(Message::Text(reply)).await.is_err() {
                        break;
                    }
                }
            }
            Event::Inbound(Some(Ok(Message::Ping(data)))) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Event::Inbound(Some(Ok(Message::Close(_)))) | Event::Inbound(None) => {
                debug!("subscriber closed connection");
                break;
            }
            Event::Inbound(Some(Ok(_))) => {
                // Pong / Binary: ignored.
            }
            Event::Inbound(Some(Err(e))) => {
                debug!(error = %e, "subscriber receive error — disconnecting");
                break;
            }
        }
    }

    if let Some(sub) = subscription {
        state.hub.deregister(sub.id);
        state.manager.release_all(sub.id);
        info!(subscriber = %sub.id, keys = sub.keys.len(), "subscriber disconnected");
    }
}

/// Next frame queued by the hub, or never if not yet subscribed.
async fn next_outbound(subscription: &mut Option<Subscription>) -> Option<Arc<str>> {
    match subscription {
        Some(sub) => sub.frames.recv().await,
        None => std::future::pending().await,
    }
}

fn apply_control(
    state: &AppState,
    text: &str,
    subscription: &mut Option<Subscription>,
) -> Result<(), GatewayError> {
    let control: ControlFrame = serde_json::from_str(text)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid control frame: {e}")))?;

    let venues: Option<HashSet<String>> = control
        .exchanges
        .map(|list| list.into_iter().map(|v| v.trim().to_lowercase()).collect());
    if venues.as_ref().is_some_and(HashSet::is_empty) {
        return Err(GatewayError::InvalidRequest("exchanges must not be empty".into()));
    }

    // Resolve everything before touching the hub or the manager so a bad
    // frame leaves the current subscription untouched.
    let keys = state.registry.keys_for(control.market, venues.as_ref())?;
    let filter = SubscriberFilter {
        selection: control.market,
        venues,
    };

    let current = match subscription.take() {
        Some(sub) => {
            state.hub.set_filter(sub.id, filter);
            sub
        }
        None => {
            let (id, frames) = state.hub.register(filter);
            Subscription {
                id,
                frames,
                keys: Vec::new(),
            }
        }
    };
    let sub = subscription.insert(current);

    for key in &keys {
        state.manager.ensure_active(key, sub.id)?;
    }
    for stale in sub.keys.iter().filter(|k| !keys.contains(k)) {
        state.manager.release(stale, sub.id);
    }
    info!(
        subscriber = %sub.id,
        market = ?control.market,
        keys = ?keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "subscription updated"
    );
    sub.keys = keys;
    Ok(())
}
