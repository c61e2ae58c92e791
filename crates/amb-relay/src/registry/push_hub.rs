//! In-memory push hub: one live WebSocket handle per connected agent.
//!
//! Each agent holds at most one push connection at a time. A reconnect races
//! the old connection's cleanup against the new connection's attach, so
//! every mutation is identity-checked:
//!
//! - `attach` replaces whatever handle is currently stored for the agent,
//!   closing the old one first, then stores the new handle.
//! - `detach` only removes the map entry if the handle stored there is the
//!   *same* handle the caller is holding (compared by `Arc` pointer
//!   identity). A stale reader's cleanup can therefore never evict a
//!   handle a newer connection just attached.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// A message queued for delivery to a connected agent's WebSocket.
///
/// `Close` is a hub-internal instruction (forced eviction on reconnect) and
/// is never serialized to the wire; the other variants are the JSON events
/// pushed to a recipient's channel.
#[derive(Debug, Clone)]
pub enum PushEvent {
    ConnectionRequest {
        connection_id: String,
        from_agent: String,
        message: Option<String>,
        verification_code: String,
    },
    ConnectionApproved {
        connection_id: String,
        connected_agent: String,
    },
    NewMessage {
        session_id: String,
        subject: String,
        from_agent: String,
        content: String,
        message_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
        reply_to_session_key: Option<String>,
        room: Option<String>,
    },
    Close {
        code: u16,
        reason: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum WireEvent<'a> {
    ConnectionRequest {
        connection_id: &'a str,
        from_agent: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: &'a Option<String>,
        verification_code: &'a str,
    },
    ConnectionApproved {
        connection_id: &'a str,
        connected_agent: &'a str,
    },
    NewMessage {
        session_id: &'a str,
        subject: &'a str,
        from_agent: &'a str,
        content: &'a str,
        message_id: &'a str,
        created_at: chrono::DateTime<chrono::Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to_session_key: &'a Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: &'a Option<String>,
    },
}

impl PushEvent {
    /// Render as the JSON payload sent over the wire. Returns `None` for
    /// `Close`, which never reaches a client as a frame.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        let wire = match self {
            PushEvent::ConnectionRequest {
                connection_id,
                from_agent,
                message,
                verification_code,
            } => WireEvent::ConnectionRequest {
                connection_id,
                from_agent,
                message,
                verification_code,
            },
            PushEvent::ConnectionApproved {
                connection_id,
                connected_agent,
            } => WireEvent::ConnectionApproved {
                connection_id,
                connected_agent,
            },
            PushEvent::NewMessage {
                session_id,
                subject,
                from_agent,
                content,
                message_id,
                created_at,
                reply_to_session_key,
                room,
            } => WireEvent::NewMessage {
                session_id,
                subject,
                from_agent,
                content,
                message_id,
                created_at: *created_at,
                reply_to_session_key,
                room,
            },
            PushEvent::Close { .. } => return None,
        };
        serde_json::to_value(wire).ok()
    }
}

/// One agent's live push connection.
pub struct PushHandle {
    agent_id: String,
    tx: mpsc::Sender<PushEvent>,
}

impl PushHandle {
    pub fn new(agent_id: String, tx: mpsc::Sender<PushEvent>) -> Arc<Self> {
        Arc::new(Self { agent_id, tx })
    }

    async fn close(&self) {
        let _ = self
            .tx
            .send(PushEvent::Close {
                code: 1000,
                reason: "replaced by a new connection".to_string(),
            })
            .await;
    }
}

/// Thread-safe registry of connected agents' push handles.
#[derive(Clone, Default)]
pub struct PushHub {
    handles: Arc<Mutex<HashMap<String, Arc<PushHandle>>>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new handle for `agent_id`, closing and replacing any handle
    /// already registered for that agent. Must run BEFORE the new
    /// connection's read loop starts, so a stale `detach` from the old
    /// connection observes the new handle already in place.
    pub async fn attach(&self, handle: Arc<PushHandle>) {
        let agent_id = handle.agent_id.clone();
        let previous = {
            let mut handles = self.handles.lock().await;
            handles.insert(agent_id.clone(), Arc::clone(&handle))
        };
        if let Some(previous) = previous {
            warn!(agent_id = %agent_id, "replacing existing push connection");
            previous.close().await;
        }
        info!(agent_id = %agent_id, "push connection attached");
    }

    /// Remove `handle` from the registry, but only if it is still the
    /// handle on file for its agent (pointer identity). A handle that has
    /// already been replaced by a newer `attach` is left untouched.
    pub async fn detach(&self, handle: &Arc<PushHandle>) {
        let mut handles = self.handles.lock().await;
        if let Some(current) = handles.get(&handle.agent_id) {
            if Arc::ptr_eq(current, handle) {
                handles.remove(&handle.agent_id);
                info!(agent_id = %handle.agent_id, "push connection detached");
            }
        }
    }

    /// Push an event to `agent_id` if it currently has a live connection.
    /// Returns `true` if a connection was found and the send was accepted.
    pub async fn push(&self, agent_id: &str, event: PushEvent) -> bool {
        let handle = self.handles.lock().await.get(agent_id).cloned();
        match handle {
            Some(handle) => handle.tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        self.handles.lock().await.contains_key(agent_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.handles.lock().await.len()
    }
}
