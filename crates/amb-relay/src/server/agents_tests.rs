//! Tests for `/agents/*` handlers.

use axum::Json;
use axum::extract::State;

use super::agents::{MeResponse, RegisterRequest, me, register};
use super::auth::AuthedAgent;
use super::test_support::{register_agent, test_state};
use crate::credentials;
use crate::error::ApiError;

#[tokio::test]
async fn register_returns_68_char_key_and_agent_identity() {
    let state = test_state().await;
    let resp = register_agent(&state, "alice").await;

    assert_eq!(resp.name, "alice");
    assert_eq!(resp.api_key.len(), 68);
    assert!(resp.api_key.starts_with("amb_"));

    let agent = credentials::authenticate(&state.db, &resp.api_key).await.unwrap();
    let Json(me_resp): Json<MeResponse> = me(AuthedAgent(agent)).await;
    assert_eq!(me_resp.name, "alice");
    assert_eq!(me_resp.id, resp.id);
}

#[tokio::test]
async fn register_rejects_duplicate_name() {
    let state = test_state().await;
    register_agent(&state, "alice").await;

    let err = register(
        State(state.clone()),
        Json(RegisterRequest {
            name: "alice".to_string(),
            owner_contact: None,
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn register_rejects_invalid_name_pattern() {
    let state = test_state().await;

    let err = register(
        State(state.clone()),
        Json(RegisterRequest {
            name: "a!".to_string(),
            owner_contact: None,
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn authenticate_rejects_bogus_key() {
    let state = test_state().await;
    register_agent(&state, "alice").await;

    let err = credentials::authenticate(&state.db, "amb_bogus").await.unwrap_err();
    assert!(matches!(err, ApiError::AuthInvalid));
}
