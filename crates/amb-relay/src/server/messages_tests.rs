//! Tests for `/messages/send` (threaded-session scenario S6).

use axum::Json;
use axum::extract::State;

use super::auth::AuthedAgent;
use super::connections::{ApproveBody, RequestBody, approve, request};
use super::messages::{SendRequest, send};
use super::test_support::{register_agent, test_state};
use crate::credentials;
use crate::error::ApiError;

async fn agent(state: &crate::server::AppState, name: &str) -> crate::storage::Agent {
    let resp = register_agent(state, name).await;
    credentials::authenticate(&state.db, &resp.api_key).await.unwrap()
}

async fn connect(state: &crate::server::AppState, a: &crate::storage::Agent, b_name: &str) {
    let b = agent(state, b_name).await;
    let (_, Json(req_resp)) = request(
        State(state.clone()),
        AuthedAgent(a.clone()),
        Json(RequestBody {
            target_agent_name: b_name.to_string(),
            message: None,
        }),
    )
    .await
    .unwrap();
    approve(
        State(state.clone()),
        AuthedAgent(b),
        Json(ApproveBody {
            verification_code: req_resp.verification_code,
        }),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn send_without_connection_is_forbidden() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    agent(&state, "bob").await;

    let err = send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("hi".to_string()),
            content: "hello".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn same_subject_case_folded_appends_to_one_session() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    // `agent()` inside `connect` re-registers bob under the same name, so
    // fetch bob up front to avoid a duplicate-name conflict.
    let bob_registered = agent(&state, "bob").await;
    let (_, Json(req_resp)) = request(
        State(state.clone()),
        AuthedAgent(alice.clone()),
        Json(RequestBody {
            target_agent_name: "bob".to_string(),
            message: None,
        }),
    )
    .await
    .unwrap();
    approve(
        State(state.clone()),
        AuthedAgent(bob_registered),
        Json(ApproveBody {
            verification_code: req_resp.verification_code,
        }),
    )
    .await
    .unwrap();

    let (_, Json(first)) = send(
        State(state.clone()),
        AuthedAgent(alice.clone()),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("Hi".to_string()),
            content: "first message".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap();

    let (_, Json(second)) = send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("hi".to_string()),
            content: "second message".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(first.session_id, second.session_id);
}

#[tokio::test]
async fn content_over_limit_is_rejected() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    connect(&state, &alice, "bob").await;

    let err = send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("hi".to_string()),
            content: "x".repeat(10_001),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn reply_to_session_key_and_room_are_carried_on_the_session() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    connect(&state, &alice, "bob").await;

    let (_, Json(resp)) = send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("project sync".to_string()),
            content: "join the room".to_string(),
            session_id: None,
            reply_to_session_key: Some("agent:main:dm:mailbox-alice-abcd1234".to_string()),
            room: Some("general".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(resp.room, Some("general".to_string()));
}
