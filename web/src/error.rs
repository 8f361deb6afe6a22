//! Error types for web handlers.
//!
//! Bridges engine errors and hold refusals to HTTP responses. Shoppers only
//! ever see "sold out", "too many attempts", a validation message, or the
//! generic retry-later text.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use stockhold_engine::error::RETRY_LATER_MESSAGE;
use stockhold_engine::{EngineError, HoldRejection};

/// Application error type for web handlers.
///
/// Implements Axum's `IntoResponse`; server errors are logged with their
/// source when rendered.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 409 sold-out error.
    #[must_use]
    pub fn sold_out(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, "SOLD_OUT")
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "VALIDATION_ERROR")
    }

    /// Create a 429 Too Many Requests error.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message, "TOO_MANY_ATTEMPTS")
    }

    /// Create a 500 Internal Server Error with the generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            RETRY_LATER_MESSAGE,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error with the generic message.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            RETRY_LATER_MESSAGE,
            "SERVICE_UNAVAILABLE",
        )
    }

    /// Map a hold refusal to its response.
    #[must_use]
    pub fn from_rejection(rejection: HoldRejection) -> Self {
        let message = rejection.user_message();
        match rejection {
            HoldRejection::OutOfStock => Self::sold_out(message),
            HoldRejection::RateLimited { .. } | HoldRejection::ItemCapacity { .. } => {
                Self::too_many_requests(message)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::warn!(status = %self.status, code = self.code, "Request failed"),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => Self::validation(e.to_string()),
            EngineError::StoreUnavailable(_) => Self::unavailable().with_source(err),
            EngineError::CorruptRecord { .. } => Self::internal().with_source(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockhold_core::StoreError;
    use stockhold_engine::ValidationError;
    use stockhold_engine::error::TOO_MANY_ATTEMPTS_MESSAGE;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_rejections_map_to_statuses() {
        assert_eq!(
            AppError::from_rejection(HoldRejection::OutOfStock).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from_rejection(HoldRejection::RateLimited { attempts: 5, limit: 5 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        let busy = AppError::from_rejection(HoldRejection::ItemCapacity { limit: 25 });
        assert_eq!(busy.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(busy.code, "TOO_MANY_ATTEMPTS");
        assert_eq!(busy.message, TOO_MANY_ATTEMPTS_MESSAGE);
    }

    #[test]
    fn test_engine_errors_hide_internals() {
        let err: AppError =
            EngineError::StoreUnavailable(StoreError::Unavailable("redis down".to_string())).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.message, RETRY_LATER_MESSAGE);
        assert!(std::error::Error::source(&err).is_some());

        let err: AppError = EngineError::Validation(ValidationError::ZeroAmount).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "VALIDATION_ERROR");
    }
}
