//! Forward-auth gate handler.
//!
//! The reverse proxy forwards the original request's headers to `/verify`
//! and lets the request through only on a 2xx. On success the verified
//! subject is returned in the identity header for the proxy to copy
//! downstream.

use crate::errors::GateError;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::instrument;

/// Extract the bearer token from the Authorization header.
///
/// The header must be exactly `<scheme> <token>` with the scheme matching
/// `bearer` case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, GateError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(GateError::Unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| GateError::Unauthorized("non-ascii authorization header"))?;

    let mut parts = auth_header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(GateError::Unauthorized("malformed authorization header")),
    }
}

/// Handler for `/verify` (any method).
///
/// # Response
///
/// - 401 with a `WWW-Authenticate` challenge if no bearer token was sent
/// - 403 if the token was rejected, with the same body for every reason
/// - 200 with the identity header if the token is valid
#[instrument(skip_all, name = "fa.gate.verify")]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let token = extract_bearer_token(&headers)?;

    let claims = state.validator.validate(token).await?;

    let identity = HeaderValue::from_str(&claims.sub).map_err(|_| {
        tracing::error!(target: "fa.gate", "Subject cannot be sent as a header value");
        GateError::Internal
    })?;

    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(state.config.identity_header.clone(), identity);

    Ok(response)
}
