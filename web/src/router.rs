//! Router configuration.

use crate::handlers::{admin, checkout, health::health_check, inventory, webhooks};
use crate::state::AppState;
use axum::{
    Router,
    http::HeaderName,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the complete Axum router.
///
/// Every request gets an `x-request-id` (kept if the client sent one), a
/// tracing span, and the id echoed on the response.
pub fn build_router(state: AppState) -> Router {
    let shopper_routes = Router::new()
        .route("/inventory/:item", get(inventory::get_availability))
        .route("/checkout/holds", post(checkout::create_hold))
        .route(
            "/checkout/holds/:session_id/release",
            post(checkout::release_hold),
        )
        .route("/webhooks/payments", post(webhooks::payment_event));

    let admin_routes = Router::new()
        .route("/inventory", get(admin::list_stock))
        .route("/inventory/sync", post(admin::sync_catalog))
        .route("/inventory/:item", put(admin::set_stock))
        .route("/inventory/:item/restock", post(admin::restock))
        .route("/reservations", get(admin::list_reservations))
        .route("/reservations/sweep", post(admin::run_sweep));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", shopper_routes.nest("/admin", admin_routes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
