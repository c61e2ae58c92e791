//! HTTP surface for the agent mailbox relay.

pub mod agents;
pub mod auth;
pub mod connections;
pub mod health;
pub mod inbox;
pub mod messages;
pub mod ws;

#[cfg(test)]
mod agents_tests;
#[cfg(test)]
mod inbox_tests;
#[cfg(test)]
mod messages_tests;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use amb_crypto::ContentCipher;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::registry::push_hub::PushHub;
use crate::storage::RelayDatabase;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: RelayDatabase,
    pub cipher: Arc<ContentCipher>,
    pub push_hub: PushHub,
}

/// Assemble the relay's router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::check))
        .route("/agents/register", post(agents::register))
        .route("/agents/me", get(agents::me))
        .route("/connections/request", post(connections::request))
        .route("/connections/approve", post(connections::approve))
        .route("/connections/pending", get(connections::pending))
        .route("/messages/send", post(messages::send))
        .route("/inbox", get(inbox::get_inbox))
        .route("/sessions/{id}/history", get(inbox::session_history))
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
