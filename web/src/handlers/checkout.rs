//! Checkout endpoints: place and release holds.

use crate::error::AppError;
use crate::extractors::ClientAddress;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use stockhold_engine::{Hold, HoldOutcome, ItemId, SessionId};

const fn default_quantity() -> u32 {
    1
}

/// Request to hold stock for a checkout session.
#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    /// Item to reserve
    pub item_id: String,
    /// Payment session the hold belongs to
    pub session_id: String,
    /// Units (default: 1)
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Place a hold.
///
/// # Endpoint
///
/// ```text
/// POST /api/checkout/holds
/// ```
///
/// # Responses
///
/// - 201: reserved
/// - 200: the session already holds a reservation
/// - 409: sold out
/// - 429: too many attempts from this address, or the item is at its hold limit
/// - 422: malformed ids or quantity
/// - 503: store unavailable
///
/// # Errors
///
/// Every non-2xx response above is an [`AppError`].
pub async fn create_hold(
    State(state): State<AppState>,
    ClientAddress(client_ip): ClientAddress,
    Json(request): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldOutcome>), AppError> {
    let item = ItemId::new(request.item_id).map_err(|e| AppError::validation(e.to_string()))?;
    let session =
        SessionId::new(request.session_id).map_err(|e| AppError::validation(e.to_string()))?;

    let outcome = state
        .engine
        .reservations()
        .create_hold(&item, &session, request.quantity, client_ip.as_ref())
        .await?;

    match outcome {
        HoldOutcome::Reserved { .. } => Ok((StatusCode::CREATED, Json(outcome))),
        HoldOutcome::AlreadyHeld => Ok((StatusCode::OK, Json(outcome))),
        HoldOutcome::Rejected { rejection } => Err(AppError::from_rejection(rejection)),
    }
}

/// Result of releasing a hold.
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    /// `false` if the session had no hold
    pub released: bool,
    /// The released hold
    pub hold: Option<Hold>,
}

/// Release a session's hold (checkout abandoned).
///
/// Idempotent: releasing twice returns `released: false` the second time.
///
/// # Endpoint
///
/// ```text
/// POST /api/checkout/holds/:session_id/release
/// ```
///
/// # Errors
///
/// 422 for a malformed session id, 503 if the store is unavailable.
pub async fn release_hold(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let session = SessionId::new(session_id).map_err(|e| AppError::validation(e.to_string()))?;
    let hold = state.engine.reservations().release_hold(&session).await?;

    Ok(Json(ReleaseResponse {
        released: hold.is_some(),
        hold,
    }))
}
