//! Access control integration tests.
//!
//! Drives the demo router over HTTP with tokens signed by fixture keys that a
//! mock identity provider publishes.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use gk_test_utils::*;
use jsonwebtoken::{Algorithm, Header};
use reqwest::StatusCode;
use serde_json::Value;

struct Setup {
    keypair: TestKeypair,
    server: TestGatekeeperServer,
    client: reqwest::Client,
}

async fn setup() -> Result<Setup> {
    let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
    let server = TestGatekeeperServer::spawn(&[&keypair]).await?;
    Ok(Setup {
        keypair,
        server,
        client: reqwest::Client::new(),
    })
}

impl Setup {
    fn token_for(&self, subject: &str) -> String {
        TestTokenBuilder::new()
            .for_subject(subject)
            .with_email("alice@example.com")
            .sign(&self.keypair)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.get(format!("{}{}", self.server.url(), path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

async fn assert_error_body(response: reqwest::Response, message: &str) -> Result<()> {
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], message);
    assert_eq!(body.as_object().unwrap().len(), 2, "no extra detail fields");
    Ok(())
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_health_is_public() -> Result<()> {
    let s = setup().await?;

    let response = s.get("/v1/health", None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    // Public routes never touch the key set
    assert_eq!(s.server.jwks_fetches().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_public_route_ignores_invalid_token() -> Result<()> {
    let s = setup().await?;

    let response = s.get("/v1/health", Some("not.a.token")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let s = setup().await?;

    let response = s.get("/metrics", None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

// ============================================================================
// Route lookup
// ============================================================================

#[tokio::test]
async fn test_undeclared_route_is_not_found_regardless_of_token() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_ADMIN);

    let anonymous = s.get("/does-not-exist", None).await?;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);
    assert_error_body(anonymous, "Not Found").await?;

    let with_token = s.get("/does-not-exist", Some(&token)).await?;
    assert_eq!(with_token.status(), StatusCode::NOT_FOUND);

    // Lookup happens before any token work
    assert_eq!(s.server.jwks_fetches().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_wrong_method_is_not_found() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_ADMIN);

    // Only POST /admin/reload is declared
    let response = s.get("/admin/reload", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_head_uses_get_access_rules() -> Result<()> {
    let s = setup().await?;
    let head = |path: &str| s.client.head(format!("{}{}", s.server.url(), path));

    let public = head("/v1/health").send().await?;
    assert_eq!(public.status(), StatusCode::OK);

    let anonymous = head("/admin/dashboard").send().await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let user = head("/admin/dashboard")
        .bearer_auth(s.token_for(TEST_SUBJECT_USER))
        .send()
        .await?;
    assert_eq!(user.status(), StatusCode::FORBIDDEN);

    let admin = head("/admin/dashboard")
        .bearer_auth(s.token_for(TEST_SUBJECT_ADMIN))
        .send()
        .await?;
    assert_eq!(admin.status(), StatusCode::OK);
    Ok(())
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_me_requires_token() -> Result<()> {
    let s = setup().await?;

    let response = s.get("/v1/me", None).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get("www-authenticate")
        .expect("401 carries a challenge")
        .to_str()?
        .to_string();
    assert!(challenge.starts_with("Bearer"));
    assert_error_body(response, "Not authenticated").await?;
    Ok(())
}

#[tokio::test]
async fn test_me_with_valid_token() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["sub"], TEST_SUBJECT_USER);
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["roles"], serde_json::json!([ROLE_USER]));
    assert!(body["exp"].as_i64().is_some());
    Ok(())
}

#[tokio::test]
async fn test_expired_token_rejected() -> Result<()> {
    let s = setup().await?;
    // Beyond the default 300s clock skew
    let token = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .expires_in(-3600)
        .sign(&s.keypair);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_audience_mismatch_rejected() -> Result<()> {
    let s = setup().await?;
    let token = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .with_audience("some-other-service")
        .sign(&s.keypair);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_missing_audience_rejected() -> Result<()> {
    let s = setup().await?;
    let token = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .without_audience()
        .sign(&s.keypair);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_missing_subject_rejected() -> Result<()> {
    let s = setup().await?;
    let token = TestTokenBuilder::new().without_subject().sign(&s.keypair);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_fetches_once() -> Result<()> {
    let s = setup().await?;
    let stranger = TestKeypair::new(7, "not-published");
    let token = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .sign(&stranger);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(s.server.jwks_fetches().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_forged_signature_rejected() -> Result<()> {
    let s = setup().await?;
    // Same kid as the published key, different private key
    let impostor = TestKeypair::new(9, TEST_KEY_ID_1);
    let token = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .sign(&impostor);

    let response = s.get("/admin/dashboard", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_token_without_kid_rejected() -> Result<()> {
    let s = setup().await?;
    let claims = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .build();
    let token = s
        .keypair
        .sign_with_header(&Header::new(Algorithm::EdDSA), &claims)?;

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(s.server.jwks_fetches().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_key_set_is_cached_across_requests() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    for _ in 0..3 {
        let response = s.get("/v1/me", Some(&token)).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(s.server.jwks_fetches().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_unauthenticated_bodies_are_identical() -> Result<()> {
    let s = setup().await?;
    let expired = TestTokenBuilder::new()
        .for_subject(TEST_SUBJECT_ADMIN)
        .expires_in(-3600)
        .sign(&s.keypair);
    let stranger = TestKeypair::new(7, "not-published");
    let unknown_kid = TestTokenBuilder::new().sign(&stranger);

    let mut bodies = Vec::new();
    for token in [None, Some(expired.as_str()), Some(unknown_kid.as_str())] {
        let response = s.get("/v1/me", token).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(response.text().await?);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
    Ok(())
}

// ============================================================================
// Token sources
// ============================================================================

#[tokio::test]
async fn test_token_from_alt_header() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s
        .client
        .get(format!("{}/v1/me", s.server.url()))
        .header("x-access-token", &token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_token_from_cookie() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s
        .client
        .get(format!("{}/v1/me", s.server.url()))
        .header("cookie", format!("theme=dark; access_token={token}"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_token_from_query_param() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s
        .get(&format!("/v1/me?access_token={token}"), None)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_malformed_header_falls_back_to_cookie() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s
        .client
        .get(format!("{}/v1/me", s.server.url()))
        .header("authorization", "Bearer garbage")
        .header("cookie", format!("access_token={token}"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_admin_dashboard_forbidden_for_user() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let response = s.get("/admin/dashboard", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_error_body(response, "Forbidden: insufficient role").await?;
    Ok(())
}

#[tokio::test]
async fn test_admin_dashboard_allowed_for_admin() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_ADMIN);

    let response = s.get("/admin/dashboard", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let routes = body["routes"].as_array().unwrap();
    assert_eq!(routes.len(), gatekeeper::routes::route_table().len());

    let dashboard = routes
        .iter()
        .find(|r| r["path_template"] == "/admin/dashboard")
        .unwrap();
    assert_eq!(dashboard["allowed_roles"], serde_json::json!([ROLE_ADMIN]));

    assert_eq!(body["key_set"]["key_count"], 1);
    assert_eq!(body["key_set"]["fetch_count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_subject_without_roles_is_forbidden() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_NOBODY);

    let response = s.get("/v1/me", Some(&token)).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn test_user_route_reports_self() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    let own = s
        .get(&format!("/users/{TEST_SUBJECT_USER}"), Some(&token))
        .await?;
    assert_eq!(own.status(), StatusCode::OK);
    let body: Value = own.json().await?;
    assert_eq!(body["is_self"], true);

    let other = s
        .get(&format!("/users/{TEST_SUBJECT_ADMIN}"), Some(&token))
        .await?;
    assert_eq!(other.status(), StatusCode::OK);
    let body: Value = other.json().await?;
    assert_eq!(body["id"], TEST_SUBJECT_ADMIN);
    assert_eq!(body["is_self"], false);
    Ok(())
}

// ============================================================================
// Operator endpoints
// ============================================================================

#[tokio::test]
async fn test_reload_rebuilds_directory() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_ADMIN);

    let response = s
        .client
        .post(format!("{}/admin/reload", s.server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["reloaded"], gatekeeper::routes::route_table().len());
    Ok(())
}

#[tokio::test]
async fn test_key_refresh_refetches() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_ADMIN);

    let response = s
        .client
        .post(format!("{}/admin/keys/refresh", s.server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["reloaded"], 1);
    // One fetch to verify the caller, one forced
    assert_eq!(s.server.jwks_fetches().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_operator_endpoints_forbidden_for_user() -> Result<()> {
    let s = setup().await?;
    let token = s.token_for(TEST_SUBJECT_USER);

    for path in ["/admin/reload", "/admin/keys/refresh"] {
        let response = s
            .client
            .post(format!("{}{}", s.server.url(), path))
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
    Ok(())
}

// ============================================================================
// Disabled mode
// ============================================================================

#[tokio::test]
async fn test_disabled_mode_passes_through() -> Result<()> {
    let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
    let server =
        TestGatekeeperServer::spawn_with_vars(&[&keypair], &[("AUTH_ENABLED", "false")]).await?;
    let client = reqwest::Client::new();

    let dashboard = client
        .get(format!("{}/admin/dashboard", server.url()))
        .send()
        .await?;
    assert_eq!(dashboard.status(), StatusCode::OK);

    // Handlers that need an identity still refuse
    let me = client.get(format!("{}/v1/me", server.url())).send().await?;
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    let health: Value = client
        .get(format!("{}/v1/health", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["auth_enabled"], false);
    Ok(())
}
