//! Payment provider notifications.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use stockhold_engine::{EventOutcome, PaymentEvent};

/// Apply a payment-session notification.
///
/// The provider's signature is verified upstream. A 5xx response asks the
/// provider to redeliver.
///
/// # Endpoint
///
/// ```text
/// POST /api/webhooks/payments
/// ```
///
/// # Errors
///
/// 503 if the store is unavailable, 500 for a corrupt hold record.
pub async fn payment_event(
    State(state): State<AppState>,
    Json(event): Json<PaymentEvent>,
) -> Result<Json<EventOutcome>, AppError> {
    tracing::info!(
        session_id = %event.session_id,
        event = ?event.event,
        "Payment notification received"
    );
    let outcome = state.engine.events().handle(&event).await?;
    Ok(Json(outcome))
}
