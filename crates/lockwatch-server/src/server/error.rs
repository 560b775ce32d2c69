//! Application-level error type for HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::probe::ProbeError;
use crate::storage::DatabaseError;

/// Wraps domain errors and adds HTTP-specific variants. Implements
/// [`IntoResponse`] to produce consistent JSON error bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Probe failures keep their own shape: "offline" and "no answer"
    /// must stay distinguishable from a confirmed `unknown` status.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Self::Probe(ProbeError::Offline(pc_id)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DEVICE_OFFLINE",
                format!("Device {pc_id} is offline, retry later"),
            ),
            Self::Probe(ProbeError::NoAnswer(pc_id)) => (
                StatusCode::GATEWAY_TIMEOUT,
                "NO_ANSWER",
                format!("Device {pc_id} did not answer the probe"),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
