//! `X-API-Key` authentication extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::credentials;
use crate::error::ApiError;
use crate::storage::Agent;

use super::AppState;

/// The authenticated agent making the current request, resolved from the
/// `X-API-Key` header.
pub struct AuthedAgent(pub Agent);

impl FromRequestParts<AppState> for AuthedAgent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::AuthInvalid)?;
        let agent = credentials::authenticate(&state.db, raw_key).await?;
        Ok(AuthedAgent(agent))
    }
}
