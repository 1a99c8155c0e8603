//! Forward-auth HTTP error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are fixed per status so a denied caller cannot tell
//! which check failed. The actual reason is logged server-side.

use crate::auth::ValidationError;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Challenge sent with every 401.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Bearer realm=\"forward-auth\"";

/// Gate error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401, no usable credentials were presented
/// - Forbidden: 403, credentials were presented and rejected
/// - Internal: 500
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal,
}

/// Every validation failure is a 403. The kind is kept for logs only.
impl From<ValidationError> for GateError {
    fn from(err: ValidationError) -> Self {
        GateError::Forbidden(err.kind().to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GateError::Unauthorized(reason) => {
                tracing::debug!(target: "fa.gate", reason = %reason, "Request without usable bearer token");
                (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Authentication required",
                )
            }
            GateError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied"),
            GateError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
            );
        }

        response
    }
}
