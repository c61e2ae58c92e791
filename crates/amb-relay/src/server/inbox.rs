//! `/inbox` and `/sessions/{id}/history` handlers.

use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::storage::queries;

use super::AppState;
use super::auth::AuthedAgent;

const RECENT_MESSAGES_LIMIT: i64 = 3;
const DEFAULT_HISTORY_LIMIT: i64 = 3;
const MAX_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub reply_to_session_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub subject: String,
    pub other_agent_name: String,
    pub unread_count: i64,
    pub last_message_at: DateTime<Utc>,
    pub recent_messages: Vec<MessageSummary>,
}

#[derive(Debug, Serialize)]
pub struct PendingConnectionSummary {
    pub connection_id: String,
    pub from_agent_name: String,
    pub message: Option<String>,
    pub verification_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub sessions: Vec<SessionSummary>,
    pub pending_connections: Vec<PendingConnectionSummary>,
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// `GET /inbox?unread_only=bool`.
pub async fn get_inbox(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>, ApiError> {
    let pool = state.db.pool();
    let sessions = queries::list_sessions_for_agent(pool, &caller.id).await?;

    let other_agent_ids: Vec<String> = sessions
        .iter()
        .map(|s| s.other(&caller.id).to_string())
        .collect();
    let other_agents: HashMap<String, crate::storage::Agent> =
        queries::get_agents_by_ids(pool, &other_agent_ids)
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

    let mut session_summaries = Vec::new();
    for session in sessions {
        let unread_count = queries::count_unread(pool, &session.id, &caller.id).await?;
        if query.unread_only && unread_count == 0 {
            continue;
        }

        let recent = queries::recent_messages(pool, &session.id, RECENT_MESSAGES_LIMIT).await?;

        let sender_ids: HashSet<String> = recent.iter().map(|m| m.sender_id.clone()).collect();
        let missing: Vec<String> = sender_ids
            .into_iter()
            .filter(|id| *id != caller.id && !other_agents.contains_key(id))
            .collect();
        let mut senders: HashMap<String, String> = other_agents
            .iter()
            .map(|(id, a)| (id.clone(), a.name.clone()))
            .collect();
        senders.insert(caller.id.clone(), caller.name.clone());
        if !missing.is_empty() {
            for agent in queries::get_agents_by_ids(pool, &missing).await? {
                senders.insert(agent.id.clone(), agent.name);
            }
        }

        let other_agent_id = session.other(&caller.id).to_string();
        let other_agent_name = other_agents
            .get(&other_agent_id)
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let message_summaries: Vec<MessageSummary> = recent
            .into_iter()
            .rev()
            .map(|m| MessageSummary {
                sender_name: senders.get(&m.sender_id).cloned().unwrap_or_default(),
                content: state.cipher.decrypt(&m.content),
                id: m.id,
                created_at: m.created_at,
                is_read: m.is_read,
                reply_to_session_key: m.reply_to_session_key,
            })
            .collect();

        session_summaries.push(SessionSummary {
            session_id: session.id,
            subject: session.subject,
            other_agent_name,
            unread_count,
            last_message_at: session.last_message_at,
            recent_messages: message_summaries,
        });
    }

    let now = Utc::now();
    let pending = queries::list_live_pending_for_agent(pool, &caller.id, &caller.name, now).await?;
    let pending: Vec<_> = pending
        .into_iter()
        .filter(|c| c.target_agent_name == caller.name)
        .collect();

    let requester_ids: Vec<String> = pending.iter().map(|c| c.requester_id.clone()).collect();
    let requesters: HashMap<String, String> = queries::get_agents_by_ids(pool, &requester_ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let pending_connections = pending
        .into_iter()
        .map(|c| PendingConnectionSummary {
            from_agent_name: requesters.get(&c.requester_id).cloned().unwrap_or_default(),
            connection_id: c.id,
            message: c.message,
            verification_code: c.verification_code,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(InboxResponse {
        sessions: session_summaries,
        pending_connections,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub subject: String,
    pub messages: Vec<MessageSummary>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// `GET /sessions/{id}/history?limit=N`.
pub async fn session_history(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let pool = state.db.pool();
    let session = queries::get_session_by_id(pool, &session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    if !session.participates(&caller.id) {
        return Err(ApiError::Forbidden(
            "not a participant of this session".to_string(),
        ));
    }

    let messages = queries::recent_messages(pool, &session_id, limit).await?;

    let to_mark: Vec<String> = messages
        .iter()
        .filter(|m| m.sender_id != caller.id && !m.is_read)
        .map(|m| m.id.clone())
        .collect();
    if !to_mark.is_empty() {
        queries::mark_messages_read(pool, &to_mark).await?;
    }

    let sender_ids: Vec<String> = messages
        .iter()
        .map(|m| m.sender_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let senders: HashMap<String, String> = queries::get_agents_by_ids(pool, &sender_ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let message_summaries = messages
        .into_iter()
        .rev()
        .map(|m| {
            let is_read_for_caller = m.sender_id != caller.id || m.is_read;
            MessageSummary {
                sender_name: senders.get(&m.sender_id).cloned().unwrap_or_default(),
                content: state.cipher.decrypt(&m.content),
                id: m.id,
                created_at: m.created_at,
                is_read: is_read_for_caller,
                reply_to_session_key: m.reply_to_session_key,
            }
        })
        .collect();

    Ok(Json(SessionHistoryResponse {
        session_id: session.id,
        subject: session.subject,
        messages: message_summaries,
    }))
}
