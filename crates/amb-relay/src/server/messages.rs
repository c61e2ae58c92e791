//! `/messages/send` handler.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::registry::push_hub::PushEvent;
use crate::storage::queries;

use super::AppState;
use super::auth::AuthedAgent;

const SUBJECT_MAX_LEN: usize = 255;
const CONTENT_MAX_LEN: usize = 10_000;
const ROOM_MAX_LEN: usize = 255;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: Option<String>,
    pub content: String,
    pub session_id: Option<String>,
    pub reply_to_session_key: Option<String>,
    pub room: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message_id: String,
    pub session_id: String,
    pub subject: String,
    pub created_at: chrono::DateTime<Utc>,
    pub room: Option<String>,
}

fn room_is_valid(room: &str) -> bool {
    !room.is_empty()
        && room.len() <= ROOM_MAX_LEN
        && room
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `POST /messages/send`.
pub async fn send(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
    Json(body): Json<SendRequest>,
) -> Result<(axum::http::StatusCode, Json<SendResponse>), ApiError> {
    if body.content.is_empty() || body.content.len() > CONTENT_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "content must be 1-{CONTENT_MAX_LEN} characters"
        )));
    }
    if body.subject.as_ref().is_some_and(|s| s.len() > SUBJECT_MAX_LEN) {
        return Err(ApiError::Validation(format!(
            "subject must be at most {SUBJECT_MAX_LEN} characters"
        )));
    }
    if body.room.as_ref().is_some_and(|r| !room_is_valid(r)) {
        return Err(ApiError::Validation(
            "room must match [A-Za-z0-9_-]+ and be at most 255 characters".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;
    let now = Utc::now();

    let target = queries::get_agent_by_name(&mut *tx, &body.to)
        .await?
        .ok_or_else(|| ApiError::NotFound("target agent not found".to_string()))?;

    if queries::find_active_connection_between_ids(&mut *tx, &caller.id, &target.id)
        .await?
        .is_none()
    {
        return Err(ApiError::Forbidden(
            "no active connection with target agent".to_string(),
        ));
    }

    let (session_id, subject) = if let Some(session_id) = &body.session_id {
        let session = queries::get_session_by_id(&mut *tx, session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;
        if !session.participates(&caller.id) || !session.participates(&target.id) {
            return Err(ApiError::Forbidden(
                "not a participant of this session".to_string(),
            ));
        }
        (session.id, session.subject)
    } else {
        let subject = body
            .subject
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ApiError::Validation("subject is required when session_id is not provided".to_string())
            })?;
        let subject_lower = subject.to_lowercase();
        let existing = queries::find_session_by_subject(
            &mut *tx,
            &subject_lower,
            &caller.id,
            &target.id,
        )
        .await?;
        match existing {
            Some(session) => (session.id, session.subject),
            None => {
                let new_id = Uuid::new_v4().to_string();
                queries::insert_session(&mut *tx, &new_id, &subject, &caller.id, &target.id, now)
                    .await?;
                (new_id, subject)
            }
        }
    };

    let message_id = Uuid::new_v4().to_string();
    let encrypted = state.cipher.encrypt(&body.content);
    queries::insert_message(
        &mut *tx,
        &message_id,
        &session_id,
        &caller.id,
        &encrypted,
        body.reply_to_session_key.as_deref(),
        body.room.as_deref(),
        now,
    )
    .await?;
    queries::touch_session_last_message_at(&mut *tx, &session_id, now).await?;

    tx.commit().await.map_err(crate::storage::DatabaseError::from)?;

    state
        .push_hub
        .push(
            &target.id,
            PushEvent::NewMessage {
                session_id: session_id.clone(),
                subject: subject.clone(),
                from_agent: caller.name.clone(),
                content: body.content.clone(),
                message_id: message_id.clone(),
                created_at: now,
                reply_to_session_key: body.reply_to_session_key.clone(),
                room: body.room.clone(),
            },
        )
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(SendResponse {
            message_id,
            session_id,
            subject,
            created_at: now,
            room: body.room,
        }),
    ))
}
