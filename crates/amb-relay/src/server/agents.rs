//! `/agents/*` handlers.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials;
use crate::error::ApiError;
use crate::storage::queries;

use super::AppState;
use super::auth::AuthedAgent;

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 100;

fn name_is_valid(name: &str) -> bool {
    let len_ok = (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.chars().count());
    len_ok
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub owner_contact: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub api_key: String,
}

/// `POST /agents/register` — `{name, owner_contact?}` → `{id, name, api_key}`.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<RegisterResponse>), ApiError> {
    if !name_is_valid(&body.name) {
        return Err(ApiError::Validation(
            "name must be 3-100 characters of letters, digits, '_' or '-'".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    if queries::get_agent_by_name(&mut *tx, &body.name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("agent name already taken".to_string()));
    }

    let raw_key = credentials::generate_api_key();
    let key_hash = credentials::hash_api_key(&raw_key);
    let prefix = credentials::key_prefix(&raw_key).to_string();
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    queries::insert_agent(
        &mut *tx,
        &id,
        &body.name,
        &key_hash,
        &prefix,
        body.owner_contact.as_deref(),
        now,
    )
    .await?;

    tx.commit().await.map_err(crate::storage::DatabaseError::from)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            name: body.name,
            api_key: raw_key,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// `GET /agents/me` — returns the caller's identity.
pub async fn me(AuthedAgent(agent): AuthedAgent) -> Json<MeResponse> {
    Json(MeResponse {
        id: agent.id,
        name: agent.name,
        created_at: agent.created_at,
    })
}
