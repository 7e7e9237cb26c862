// =============================================================================
// Gateway errors surfaced to a caller (subscriber, HTTP client, startup)
// =============================================================================
//
// Transport failures never show up here: the connection manager absorbs them
// with backoff and they only travel as `anyhow::Error` inside a session.
// =============================================================================

use thiserror::Error;

use crate::types::Market;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("venue {venue} has no {market} stream")]
    UnsupportedMarket { venue: String, market: Market },

    #[error("duplicate venue id in registry: {0}")]
    DuplicateVenue(String),

    #[error("unsupported interval: {0}")]
    UnknownInterval(String),

    #[error("{0}")]
    InvalidRequest(String),
}
