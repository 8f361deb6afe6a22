//! HTTP surface for the Stockhold reservation engine.
//!
//! # Routes
//!
//! ```text
//! GET  /health
//!
//! GET  /api/inventory/:item                      availability
//! POST /api/checkout/holds                       place a hold
//! POST /api/checkout/holds/:session_id/release   abandon checkout
//! POST /api/webhooks/payments                    payment-session notifications
//!
//! GET  /api/admin/inventory                      all stock counts
//! PUT  /api/admin/inventory/:item                set one count
//! POST /api/admin/inventory/:item/restock        add stock
//! POST /api/admin/inventory/sync                 create entries for catalog items
//! GET  /api/admin/reservations                   active and orphaned reservations
//! POST /api/admin/reservations/sweep             normal or forced sweep
//! ```
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(store, config.engine.clone());
//! let app = build_router(AppState::new(engine));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use extractors::ClientAddress;
pub use router::build_router;
pub use state::AppState;
