//! Public availability endpoint.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use stockhold_engine::ItemId;

/// Availability of one item.
///
/// `stock` and `reserved` are omitted when the store could not be read; the
/// item is then reported as unavailable.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Item
    pub item_id: ItemId,
    /// Units that can still be reserved
    pub available: u64,
    /// On-hand stock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u64>,
    /// Units held by live reservations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<u64>,
}

/// Get availability of an item.
///
/// # Endpoint
///
/// ```text
/// GET /api/inventory/:item
/// ```
///
/// # Errors
///
/// 422 for a malformed item id. Store failures degrade to `available: 0`.
pub async fn get_availability(
    State(state): State<AppState>,
    Path(item): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let item_id = ItemId::new(item).map_err(|e| AppError::validation(e.to_string()))?;

    let response = match state.engine.availability().snapshot(&item_id).await {
        Ok(snapshot) => AvailabilityResponse {
            item_id,
            available: snapshot.available,
            stock: Some(snapshot.stock),
            reserved: Some(snapshot.reserved),
        },
        Err(e) => {
            tracing::error!(item_id = %item_id, error = %e, "Availability unknown, reporting zero");
            AvailabilityResponse {
                item_id,
                available: 0,
                stock: None,
                reserved: None,
            }
        }
    };
    Ok(Json(response))
}
