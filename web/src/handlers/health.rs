//! Health check endpoint.

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `"ok"`
    pub status: &'static str,
}

/// Liveness check.
///
/// Returns 200 OK to indicate the service is running. Does NOT check Redis.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<Health>) {
    (StatusCode::OK, Json(Health { status: "ok" }))
}
