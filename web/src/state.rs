//! Application state for Axum handlers.

use stockhold_engine::Engine;

/// State shared across all HTTP handlers.
///
/// Cheap to clone; the engine shares one store handle.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Reservation engine
    pub engine: Engine,
}

impl AppState {
    /// Create the application state.
    #[must_use]
    pub const fn new(engine: Engine) -> Self {
        Self { engine }
    }
}
