//! Liveness check for the relay's HTTP surface.

use axum::http::StatusCode;

/// `GET /health` — if this handler runs, the relay is alive and accepting
/// connections.
pub async fn check() -> StatusCode {
    StatusCode::OK
}
