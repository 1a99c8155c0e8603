//! Mock JWKS endpoint helpers built on wiremock.

use crate::crypto_fixtures::TestSigningKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Full JWKS URL for a mock server.
pub fn jwks_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), JWKS_PATH)
}

/// JWKS document publishing the given keys.
pub fn jwks_document(keys: &[&TestSigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk()).collect::<Vec<_>>() })
}

/// Serve the given keys on every request.
pub async fn mount_jwks(server: &MockServer, keys: &[&TestSigningKey]) {
    mount_jwks_document(server, jwks_document(keys)).await;
}

/// Serve an arbitrary JWKS document on every request.
pub async fn mount_jwks_document(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

/// Respond to every JWKS request with `status`.
pub async fn mount_jwks_failure(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Number of JWKS requests the mock has received.
pub async fn jwks_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| {
            requests
                .iter()
                .filter(|request| request.url.path() == JWKS_PATH)
                .count()
        })
        .unwrap_or(0)
}
