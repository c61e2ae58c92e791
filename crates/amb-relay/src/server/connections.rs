//! `/connections/*` handlers.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials;
use crate::error::ApiError;
use crate::registry::push_hub::PushEvent;
use crate::storage::queries;

use super::AppState;
use super::auth::AuthedAgent;

const MAX_PENDING_CODES: i64 = 3;
const MESSAGE_MAX_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct RequestBody {
    pub target_agent_name: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub connection_id: String,
    pub verification_code: String,
    pub target_agent_name: String,
    pub status: String,
}

/// `POST /connections/request`.
pub async fn request(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
    Json(body): Json<RequestBody>,
) -> Result<(axum::http::StatusCode, Json<RequestResponse>), ApiError> {
    if body.target_agent_name == caller.name {
        return Err(ApiError::Validation("cannot connect to yourself".to_string()));
    }

    if body.message.as_ref().is_some_and(|m| m.len() > MESSAGE_MAX_LEN) {
        return Err(ApiError::Validation(format!(
            "message must be at most {MESSAGE_MAX_LEN} characters"
        )));
    }

    let mut tx = state.db.begin().await?;
    let now = Utc::now();

    let target = queries::get_agent_by_name(&mut *tx, &body.target_agent_name)
        .await?
        .ok_or_else(|| ApiError::NotFound("target agent not found".to_string()))?;

    if queries::find_active_connection_between(
        &mut *tx,
        &caller.id,
        &caller.name,
        &target.id,
        &target.name,
    )
    .await?
    .is_some()
    {
        return Err(ApiError::Conflict("connection already exists".to_string()));
    }

    let pending_count = queries::count_live_pending_for_requester(&mut *tx, &caller.id, now).await?;
    if pending_count >= MAX_PENDING_CODES {
        return Err(ApiError::TooManyPending);
    }

    if queries::find_pending_connection_between(
        &mut *tx,
        &caller.id,
        &caller.name,
        &target.id,
        &target.name,
        now,
    )
    .await?
    .is_some()
    {
        return Err(ApiError::Conflict("pending request already exists".to_string()));
    }

    let code = credentials::generate_verification_code(&state.db).await?;
    let connection_id = Uuid::new_v4().to_string();

    queries::insert_connection(
        &mut *tx,
        &connection_id,
        &caller.id,
        &target.name,
        &code,
        body.message.as_deref(),
        now,
    )
    .await?;

    tx.commit().await.map_err(crate::storage::DatabaseError::from)?;

    state
        .push_hub
        .push(
            &target.id,
            PushEvent::ConnectionRequest {
                connection_id: connection_id.clone(),
                from_agent: caller.name.clone(),
                message: body.message.clone(),
                verification_code: code.clone(),
            },
        )
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(RequestResponse {
            connection_id,
            verification_code: code,
            target_agent_name: target.name,
            status: "PENDING".to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    pub verification_code: String,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub connection_id: String,
    pub status: String,
    pub connected_agent_name: String,
}

/// `POST /connections/approve`.
pub async fn approve(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
    Json(body): Json<ApproveBody>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let mut tx = state.db.begin().await?;
    let now = Utc::now();

    let connection = queries::get_connection_by_code(&mut *tx, &body.verification_code)
        .await?
        .ok_or_else(|| ApiError::NotFound("code not found or already used".to_string()))?;

    if connection.expires_at < now {
        return Err(ApiError::Expired);
    }

    if connection.target_agent_name != caller.name {
        return Err(ApiError::Forbidden("not the target agent".to_string()));
    }

    if queries::find_active_connection_between_ids(&mut *tx, &connection.requester_id, &caller.id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "connection already exists in reverse direction".to_string(),
        ));
    }

    queries::approve_connection(&mut *tx, &connection.id, &caller.id, now).await?;

    let requester = queries::get_agent_by_id(&mut *tx, &connection.requester_id)
        .await?
        .ok_or_else(|| ApiError::Internal("requester agent vanished".to_string()))?;

    tx.commit().await.map_err(crate::storage::DatabaseError::from)?;

    state
        .push_hub
        .push(
            &requester.id,
            PushEvent::ConnectionApproved {
                connection_id: connection.id.clone(),
                connected_agent: caller.name.clone(),
            },
        )
        .await;

    Ok(Json(ApproveResponse {
        connection_id: connection.id,
        status: "ACTIVE".to_string(),
        connected_agent_name: requester.name,
    }))
}

#[derive(Debug, Serialize)]
pub struct PendingDetail {
    pub id: String,
    pub direction: &'static str,
    pub other_agent_name: String,
    pub code: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// `GET /connections/pending`.
pub async fn pending(
    State(state): State<AppState>,
    AuthedAgent(caller): AuthedAgent,
) -> Result<Json<Vec<PendingDetail>>, ApiError> {
    let now = Utc::now();
    let connections =
        queries::list_live_pending_for_agent(state.db.pool(), &caller.id, &caller.name, now)
            .await?;

    let mut details = Vec::with_capacity(connections.len());
    for c in connections {
        let (direction, other_agent_name) = if c.requester_id == caller.id {
            ("outgoing", c.target_agent_name.clone())
        } else {
            let requester = queries::get_agent_by_id(state.db.pool(), &c.requester_id)
                .await?
                .ok_or_else(|| ApiError::Internal("requester agent vanished".to_string()))?;
            ("incoming", requester.name)
        };
        details.push(PendingDetail {
            id: c.id,
            direction,
            other_agent_name,
            code: c.verification_code,
            created_at: c.created_at,
        });
    }

    Ok(Json(details))
}
