//! HTTP-level tests for `/verify` against a spawned gate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fa_test_utils::*;
use forward_auth::revocation::{InMemoryRevocationStore, RevocationStore};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

struct Gate {
    _jwks: MockServer,
    key: TestSigningKey,
    server: TestGateServer,
    client: reqwest::Client,
}

impl Gate {
    async fn start() -> anyhow::Result<Self> {
        Self::start_with(&[], None).await
    }

    async fn start_with(
        overrides: &[(&str, &str)],
        revocation_store: Option<Arc<dyn RevocationStore>>,
    ) -> anyhow::Result<Self> {
        let jwks = MockServer::start().await;
        let key = TestSigningKey::rsa("k1");
        mount_jwks(&jwks, &[&key]).await;
        let server =
            TestGateServer::spawn_with(&jwks_url(&jwks), overrides, revocation_store).await?;

        Ok(Self {
            _jwks: jwks,
            key,
            server,
            client: reqwest::Client::new(),
        })
    }

    fn verify_url(&self) -> String {
        format!("{}/verify", self.server.url())
    }

    async fn verify_with(&self, authorization: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.verify_url())
            .header("Authorization", authorization)
            .send()
            .await?)
    }
}

#[tokio::test]
async fn test_valid_token_is_allowed_with_identity_header() -> anyhow::Result<()> {
    let gate = Gate::start().await?;
    let token = gate.key.sign(&TestClaimsBuilder::new().build());

    let response = gate.verify_with(&format!("Bearer {token}")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-user-id").unwrap(),
        DEFAULT_SUBJECT
    );
    Ok(())
}

#[tokio::test]
async fn test_any_method_is_verified() -> anyhow::Result<()> {
    let gate = Gate::start().await?;
    let token = gate.key.sign(&TestClaimsBuilder::new().build());

    for method in [reqwest::Method::POST, reqwest::Method::PUT, reqwest::Method::DELETE] {
        let response = gate
            .client
            .request(method.clone(), gate.verify_url())
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "method {method}");
    }
    Ok(())
}

#[tokio::test]
async fn test_scheme_is_case_insensitive() -> anyhow::Result<()> {
    let gate = Gate::start().await?;
    let token = gate.key.sign(&TestClaimsBuilder::new().build());

    for scheme in ["bearer", "BEARER", "BeArEr"] {
        let response = gate.verify_with(&format!("{scheme} {token}")).await?;
        assert_eq!(response.status(), StatusCode::OK, "scheme {scheme}");
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_authorization_is_unauthorized() -> anyhow::Result<()> {
    let gate = Gate::start().await?;

    let response = gate.client.get(gate.verify_url()).send().await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer realm=\"forward-auth\""
    );
    assert!(response.headers().get("x-user-id").is_none());

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn test_unusable_authorization_is_unauthorized() -> anyhow::Result<()> {
    let gate = Gate::start().await?;

    for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer ", "Token abc", "Bearer a b"] {
        let response = gate.verify_with(header).await?;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "header {header:?}"
        );
        assert!(response.headers().contains_key("www-authenticate"));
    }
    Ok(())
}

#[tokio::test]
async fn test_rejected_tokens_are_forbidden_with_uniform_body() -> anyhow::Result<()> {
    let gate = Gate::start().await?;

    let expired = gate.key.sign(&TestClaimsBuilder::new().expires_in(-1).build());
    let wrong_issuer = gate
        .key
        .sign(&TestClaimsBuilder::new().issued_by("https://evil.example").build());
    let garbage = "not.a.token".to_string();

    let mut bodies = Vec::new();
    for token in [expired, wrong_issuer, garbage] {
        let response = gate.verify_with(&format!("Bearer {token}")).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("www-authenticate").is_none());
        assert!(response.headers().get("x-user-id").is_none());
        bodies.push(response.text().await?);
    }

    let first = bodies.first().unwrap();
    assert!(bodies.iter().all(|body| body == first));
    assert!(!first.contains("evil.example"));
    assert!(!first.contains("expired"));
    Ok(())
}

#[tokio::test]
async fn test_custom_identity_header() -> anyhow::Result<()> {
    let gate = Gate::start_with(&[("IDENTITY_HEADER", "X-Forwarded-User")], None).await?;
    let token = gate
        .key
        .sign(&TestClaimsBuilder::new().for_subject("alice").build());

    let response = gate.verify_with(&format!("Bearer {token}")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-forwarded-user").unwrap(), "alice");
    assert!(response.headers().get("x-user-id").is_none());
    Ok(())
}

#[tokio::test]
async fn test_subject_not_representable_as_header_is_internal_error() -> anyhow::Result<()> {
    let gate = Gate::start().await?;
    let token = gate
        .key
        .sign(&TestClaimsBuilder::new().for_subject("line\nbreak").build());

    let response = gate.verify_with(&format!("Bearer {token}")).await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn test_revoked_token_is_forbidden() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryRevocationStore::new());
    store.revoke("jti-gone", Duration::from_secs(600)).await?;
    let gate = Gate::start_with(&[], Some(store as Arc<dyn RevocationStore>)).await?;

    let revoked = gate
        .key
        .sign(&TestClaimsBuilder::new().with_jti("jti-gone").build());
    let response = gate.verify_with(&format!("Bearer {revoked}")).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let live = gate
        .key
        .sign(&TestClaimsBuilder::new().with_jti("jti-here").build());
    let response = gate.verify_with(&format!("Bearer {live}")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
