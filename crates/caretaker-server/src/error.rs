//! HTTP error types for the caretaker server.
//!
//! Every error variant produces a small structured JSON body; handler errors
//! are never surfaced as stack traces. The cold-tenant sentinel is its own
//! variant: a 401 carrying `X-Wake-Required: 1` and the body
//! `{"error":"sleeping"}`, which clients handle by calling `/warmup` and
//! retrying. It is deliberately distinct from the ordinary unauthenticated
//! 401.

use axum::http::{header::HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use caretaker_core::error::{CentralStoreError, SessionError};

/// Header instructing the client to warm the tenant and retry.
pub const WAKE_REQUIRED: HeaderName = HeaderName::from_static("x-wake-required");

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid input.
    BadRequest(String),
    /// Missing or invalid session.
    Unauthorized(String),
    /// The tenant container is not running; the caller must warm it up.
    Sleeping,
    /// Requested resource not found.
    NotFound(String),
    /// Tenant provisioning failed for this attempt.
    WarmupFailed(String),
    /// Proxy setup or upstream I/O failed.
    BadGateway(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            // The sentinel body is exactly {"error":"sleeping"} — no message.
            Self::Sleeping => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(WAKE_REQUIRED, "1")],
                    axum::Json(serde_json::json!({"error": "sleeping"})),
                )
                    .into_response();
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::WarmupFailed(msg) => (StatusCode::SERVICE_UNAVAILABLE, "warmup_failed", msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired | SessionError::Revoked | SessionError::Invalid { .. } => {
                Self::Unauthorized(err.to_string())
            }
            SessionError::Encoding { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<CentralStoreError> for AppError {
    fn from(err: CentralStoreError) -> Self {
        Self::Internal(err.to_string())
    }
}
