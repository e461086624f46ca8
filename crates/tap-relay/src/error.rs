//! Error taxonomy for the HTTP surface.
//!
//! Persistence failures are deliberately absent from this enum: the store
//! swallows and logs them, they never reach a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed client input. No state is mutated.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// Upstream did not answer within the client timeout.
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// Upstream connection or decode failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Self::UpstreamStatus(status) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "upstream service error", "status": status })),
            )
                .into_response(),
            Self::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "upstream timeout" })),
            )
                .into_response(),
            Self::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "upstream service error", "message": msg })),
            )
                .into_response(),
            Self::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
