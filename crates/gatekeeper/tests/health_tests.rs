//! Health endpoint integration tests.
//!
//! Tests the `/v1/health` endpoint using the `TestGatekeeperServer` harness.

use gk_test_utils::{TestGatekeeperServer, TestKeypair, TEST_KEY_ID_1};

/// Test that health endpoint returns 200 and healthy status.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
    let server = TestGatekeeperServer::spawn(&[&keypair]).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["auth_enabled"], true);
    assert_eq!(body["routes"], gatekeeper::routes::route_table().len());

    Ok(())
}

/// Test that health endpoint returns JSON content type.
#[tokio::test]
async fn test_health_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
    let server = TestGatekeeperServer::spawn(&[&keypair]).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/health", server.url()))
        .send()
        .await?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        content_type.starts_with("application/json"),
        "unexpected content type: {content_type}"
    );

    Ok(())
}

/// Test that the health check survives an unreachable identity provider.
#[tokio::test]
async fn test_health_does_not_depend_on_idp() -> Result<(), anyhow::Error> {
    let server = TestGatekeeperServer::spawn_with_vars(
        &[],
        &[("JWKS_URL", "http://127.0.0.1:9/jwks.json")],
    )
    .await?;

    let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
    assert_eq!(response.status(), 200);

    Ok(())
}
