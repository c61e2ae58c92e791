//! Tests for `/inbox` and `/sessions/{id}/history` (scenario S6).

use axum::Json;
use axum::extract::{Path, Query, State};

use super::auth::AuthedAgent;
use super::connections::{ApproveBody, RequestBody, approve, request};
use super::inbox::{HistoryQuery, InboxQuery, get_inbox, session_history};
use super::messages::{SendRequest, send};
use super::test_support::{register_agent, test_state};
use crate::credentials;

async fn agent(state: &crate::server::AppState, name: &str) -> crate::storage::Agent {
    let resp = register_agent(state, name).await;
    credentials::authenticate(&state.db, &resp.api_key).await.unwrap()
}

async fn connect(state: &crate::server::AppState, a: &crate::storage::Agent, b_name: &str) -> crate::storage::Agent {
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
        AuthedAgent(b.clone()),
        Json(ApproveBody {
            verification_code: req_resp.verification_code,
        }),
    )
    .await
    .unwrap();
    b
}

#[tokio::test]
async fn inbox_shows_unread_count_and_history_flips_it_to_zero() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    let bob = connect(&state, &alice, "bob").await;

    let (_, Json(first)) = send(
        State(state.clone()),
        AuthedAgent(alice.clone()),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("Hi".to_string()),
            content: "message one".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap();

    send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("hi".to_string()),
            content: "message two".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap();

    let Json(inbox) = get_inbox(
        State(state.clone()),
        AuthedAgent(bob.clone()),
        Query(InboxQuery { unread_only: false }),
    )
    .await
    .unwrap();

    assert_eq!(inbox.sessions.len(), 1);
    let session = &inbox.sessions[0];
    assert_eq!(session.session_id, first.session_id);
    assert_eq!(session.unread_count, 2);
    assert_eq!(session.recent_messages.len(), 2);
    assert_eq!(session.recent_messages[0].content, "message one");
    assert_eq!(session.recent_messages[1].content, "message two");

    let Json(history) = session_history(
        State(state.clone()),
        AuthedAgent(bob.clone()),
        Path(first.session_id.clone()),
        Query(HistoryQuery { limit: Some(10) }),
    )
    .await
    .unwrap();
    assert_eq!(history.messages.len(), 2);

    let Json(after) = get_inbox(
        State(state.clone()),
        AuthedAgent(bob),
        Query(InboxQuery { unread_only: true }),
    )
    .await
    .unwrap();
    assert!(after.sessions.is_empty());
}

#[tokio::test]
async fn history_rejects_non_participant() {
    let state = test_state().await;
    let alice = agent(&state, "alice").await;
    connect(&state, &alice, "bob").await;
    let mallory = agent(&state, "mallory").await;

    let (_, Json(sent)) = send(
        State(state.clone()),
        AuthedAgent(alice),
        Json(SendRequest {
            to: "bob".to_string(),
            subject: Some("private".to_string()),
            content: "secret".to_string(),
            session_id: None,
            reply_to_session_key: None,
            room: None,
        }),
    )
    .await
    .unwrap();

    let err = session_history(
        State(state.clone()),
        AuthedAgent(mallory),
        Path(sent.session_id),
        Query(HistoryQuery { limit: None }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, crate::error::ApiError::Forbidden(_)));
}
