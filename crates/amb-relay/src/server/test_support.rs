//! Shared test helpers for the HTTP handler unit tests.

use std::sync::Arc;

use amb_crypto::ContentCipher;
use axum::Json;
use axum::extract::State;

use crate::registry::push_hub::PushHub;
use crate::storage::RelayDatabase;

use super::AppState;
use super::agents::{RegisterRequest, RegisterResponse, register};

pub async fn test_state() -> AppState {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    AppState {
        db,
        cipher: Arc::new(ContentCipher::new([42u8; 32])),
        push_hub: PushHub::new(),
    }
}

/// Registers an agent through the real handler and returns its raw API key
/// alongside the response body.
pub async fn register_agent(state: &AppState, name: &str) -> RegisterResponse {
    let (_, Json(resp)) = register(
        State(state.clone()),
        Json(RegisterRequest {
            name: name.to_string(),
            owner_contact: None,
        }),
    )
    .await
    .unwrap();
    resp
}
