//! HTTP request handlers for the taskhook API.
//!
//! - `ingest` - provider webhook intake; always answers 200
//! - `callback` - durable-queue deliveries into the automation processor
//! - `health` - health, liveness and readiness probes
//!
//! Error responses share one body shape:
//! `{"error":{"code":"E....","message":"..."}}`.

pub mod callback;
pub mod health;
pub mod ingest;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
pub use callback::process_callback;
pub use health::{health_check, liveness_check, readiness_check};
pub use ingest::ingest_webhook;
use serde::Serialize;
use taskhook_core::TaskhookError;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy (E1001-E3001)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Creates a standardized error response with the error's mapped status.
pub(crate) fn error_response(error: &TaskhookError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse {
        error: ErrorDetail { code: error.code().to_string(), message: error.to_string() },
    };

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_uses_taxonomy_status() {
        assert_eq!(
            error_response(&TaskhookError::client("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(&TaskhookError::unavailable("down")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_response(&TaskhookError::internal("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
