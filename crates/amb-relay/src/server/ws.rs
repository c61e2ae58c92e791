//! `GET /ws` — per-agent push channel.

use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::credentials;
use crate::registry::push_hub::{PushEvent, PushHandle};

use super::AppState;

const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct AuthFrame {
    #[serde(rename = "type")]
    kind: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
}

/// `GET /ws` upgrade handler.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let agent = match authenticate(&mut socket, &state).await {
        Ok(agent) => agent,
        Err(_) => return,
    };

    let ok = serde_json::json!({"type": "auth_ok", "agent": agent.name}).to_string();
    if socket.send(Message::Text(ok.into())).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::channel::<PushEvent>(32);
    let handle = PushHandle::new(agent.id.clone(), tx);
    state.push_hub.attach(handle.clone()).await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(PushEvent::Close { code, reason }) => {
                        let _ = socket
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                    Some(event) => {
                        if let Some(payload) = event.to_json() {
                            if socket.send(Message::Text(payload.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let is_ping = serde_json::from_str::<ClientFrame>(&text)
                            .is_ok_and(|frame| frame.kind == "ping");
                        if is_ping {
                            let pong = serde_json::json!({"type": "pong"}).to_string();
                            if socket.send(Message::Text(pong.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(agent_id = %agent.id, error = %e, "push socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.push_hub.detach(&handle).await;
    info!(agent_id = %agent.id, "push connection closed");
}

/// Wait for the first-frame auth handshake, closing the socket on any
/// failure. Returns the authenticated agent on success.
async fn authenticate(
    socket: &mut WebSocket,
    state: &AppState,
) -> Result<crate::storage::Agent, ()> {
    let raw = match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Err(()),
        Ok(Some(Ok(_))) => {
            close(socket, 4001, "invalid auth message").await;
            return Err(());
        }
        Ok(Some(Err(_))) => return Err(()),
        Err(_) => {
            close(socket, 4000, "auth timeout").await;
            return Err(());
        }
    };

    let frame: AuthFrame = match serde_json::from_str(&raw) {
        Ok(frame) => frame,
        Err(_) => {
            close(socket, 4001, "invalid auth message").await;
            return Err(());
        }
    };

    if frame.kind != "auth" {
        close(socket, 4001, "invalid auth message").await;
        return Err(());
    }
    let Some(api_key) = frame.api_key.filter(|k| !k.is_empty()) else {
        close(socket, 4001, "invalid auth message").await;
        return Err(());
    };

    match credentials::authenticate(&state.db, &api_key).await {
        Ok(agent) => Ok(agent),
        Err(_) => {
            close(socket, 4001, "invalid api key").await;
            Err(())
        }
    }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
