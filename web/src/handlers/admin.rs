//! Operator endpoints: stock counts, catalog sync, reservation reports and sweeps.
//!
//! Callers are authorized upstream.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use stockhold_engine::{
    CatalogItem, ItemId, ReservationReport, SweepMode, SweepReport, SyncReport,
};

fn parse_item(raw: String) -> Result<ItemId, AppError> {
    ItemId::new(raw).map_err(|e| AppError::validation(e.to_string()))
}

/// One ledger entry.
#[derive(Debug, Serialize)]
pub struct StockEntry {
    /// Item
    pub item_id: ItemId,
    /// On-hand stock
    pub stock: u64,
}

/// All ledger entries, ordered by item.
#[derive(Debug, Serialize)]
pub struct StockListing {
    /// Entries
    pub items: Vec<StockEntry>,
}

/// List stock counts.
///
/// # Endpoint
///
/// ```text
/// GET /api/admin/inventory
/// ```
///
/// # Errors
///
/// 503 if the store is unavailable, 500 if a count is corrupt.
pub async fn list_stock(State(state): State<AppState>) -> Result<Json<StockListing>, AppError> {
    let items = state
        .engine
        .ledger()
        .all_stock()
        .await?
        .into_iter()
        .map(|(item_id, stock)| StockEntry { item_id, stock })
        .collect();
    Ok(Json(StockListing { items }))
}

/// Absolute stock count.
#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    /// New on-hand count; negative values are rejected
    pub quantity: i64,
}

/// Result of setting a count.
#[derive(Debug, Serialize)]
pub struct SetStockResponse {
    /// Item
    pub item_id: ItemId,
    /// Count before
    pub previous: u64,
    /// Count after
    pub stock: u64,
}

/// Set stock for one item.
///
/// # Endpoint
///
/// ```text
/// PUT /api/admin/inventory/:item
/// ```
///
/// # Errors
///
/// 422 for a malformed item id or negative quantity, 503 if the store is unavailable.
pub async fn set_stock(
    State(state): State<AppState>,
    Path(item): Path<String>,
    Json(request): Json<SetStockRequest>,
) -> Result<Json<SetStockResponse>, AppError> {
    let item_id = parse_item(item)?;
    let previous = state
        .engine
        .ledger()
        .set_stock(&item_id, request.quantity)
        .await?;
    let stock = state.engine.ledger().get_stock(&item_id).await?;

    Ok(Json(SetStockResponse {
        item_id,
        previous,
        stock,
    }))
}

/// Units to add.
#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    /// Positive amount
    pub amount: u64,
}

/// Count after a restock.
#[derive(Debug, Serialize)]
pub struct RestockResponse {
    /// Item
    pub item_id: ItemId,
    /// Count after
    pub stock: u64,
}

/// Add stock to one item.
///
/// # Endpoint
///
/// ```text
/// POST /api/admin/inventory/:item/restock
/// ```
///
/// # Errors
///
/// 422 for a malformed item id or zero amount, 503 if the store is unavailable.
pub async fn restock(
    State(state): State<AppState>,
    Path(item): Path<String>,
    Json(request): Json<RestockRequest>,
) -> Result<Json<RestockResponse>, AppError> {
    let item_id = parse_item(item)?;
    let stock = state
        .engine
        .ledger()
        .increment_stock(&item_id, request.amount)
        .await?;
    Ok(Json(RestockResponse { item_id, stock }))
}

/// Catalog snapshot to reconcile.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Products the catalog lists
    pub items: Vec<CatalogItem>,
}

/// Create zero stock entries for untracked catalog items.
///
/// # Endpoint
///
/// ```text
/// POST /api/admin/inventory/sync
/// ```
pub async fn sync_catalog(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Json<SyncReport> {
    Json(state.engine.catalog().sync(&request.items).await)
}

/// Active and orphaned reservations.
///
/// # Endpoint
///
/// ```text
/// GET /api/admin/reservations
/// ```
///
/// # Errors
///
/// 503 if the store is unavailable.
pub async fn list_reservations(
    State(state): State<AppState>,
) -> Result<Json<ReservationReport>, AppError> {
    Ok(Json(state.engine.sweeper().inspect().await?))
}

/// Sweep request.
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Delete every hold and counter instead of repairing orphans
    #[serde(default)]
    pub force: bool,
    /// Required when `force` is set
    #[serde(default)]
    pub reason: Option<String>,
}

/// Run a sweep now.
///
/// # Endpoint
///
/// ```text
/// POST /api/admin/reservations/sweep
/// ```
///
/// # Errors
///
/// 422 for a forced sweep without a reason, 503 if the store is unavailable.
pub async fn run_sweep(
    State(state): State<AppState>,
    Json(request): Json<SweepRequest>,
) -> Result<Json<SweepReport>, AppError> {
    let mode = if request.force {
        SweepMode::Forced {
            reason: request.reason.unwrap_or_default(),
        }
    } else {
        SweepMode::Normal
    };
    Ok(Json(state.engine.sweeper().sweep(mode).await?))
}
