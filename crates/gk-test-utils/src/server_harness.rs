//! Test server harness for E2E testing
//!
//! Provides `TestGatekeeperServer` for spawning the real demo router against
//! a mock identity provider that serves a JWKS document.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use crate::role_fixtures::{test_role_store, test_tag_source};
use crate::test_ids::TEST_AUDIENCE;
use gatekeeper::access::AccessControl;
use gatekeeper::config::{Config, DEFAULT_JWKS_PATH};
use gatekeeper::observability::metrics::init_metrics_recorder;
use gatekeeper::routes::{self, route_table, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test harness for spawning a Gatekeeper server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
///     let server = TestGatekeeperServer::spawn(&[&keypair]).await?;
///
///     let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatekeeperServer {
    addr: SocketAddr,
    config: Config,
    access: Arc<AccessControl>,
    idp: MockServer,
    _handle: JoinHandle<()>,
}

impl TestGatekeeperServer {
    /// Spawn a server whose identity provider publishes `keypairs`.
    ///
    /// The server will:
    /// - Start a mock identity provider serving the JWKS document
    /// - Require the `authenticated` audience
    /// - Use the fixture tag map and role store
    /// - Bind to a random available port (127.0.0.1:0)
    pub async fn spawn(keypairs: &[&TestKeypair]) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(keypairs, &[]).await
    }

    /// [`TestGatekeeperServer::spawn`] with extra environment overrides.
    pub async fn spawn_with_vars(
        keypairs: &[&TestKeypair],
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let idp = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEFAULT_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keypairs)))
            .mount(&idp)
            .await;

        // Build configuration for test environment
        let mut vars = HashMap::from([
            ("IDP_URL".to_string(), idp.uri()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("JWT_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("UPSTREAM_TIMEOUT_MS".to_string(), "1000".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let access = Arc::new(AccessControl::from_config(
            &config,
            Arc::new(test_tag_source()),
            Arc::new(test_role_store()),
        ));
        access
            .reload(&route_table())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load route directory: {}", e))?;

        // Initialize metrics recorder for test server
        // Note: This may fail if already installed in the test process.
        // In that case, we create a new recorder without installing it globally.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let state = Arc::new(AppState {
            config: config.clone(),
            access: Arc::clone(&access),
            metrics_handle,
        });

        // Build routes using gatekeeper's real route builder
        let app = routes::build_routes(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            access,
            idp,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's access pipeline, for inspecting caches.
    pub fn access(&self) -> &Arc<AccessControl> {
        &self.access
    }

    /// The mock identity provider.
    pub fn idp(&self) -> &MockServer {
        &self.idp
    }

    /// Number of JWKS requests the mock identity provider has served.
    pub async fn jwks_fetches(&self) -> usize {
        self.idp
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == DEFAULT_JWKS_PATH)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Drop for TestGatekeeperServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends.
        self._handle.abort();
    }
}
