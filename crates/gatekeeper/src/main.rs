//! Gatekeeper
//!
//! Demo service fronted by the Gatekeeper access layer. Every route is
//! declared with access tags and checked before its handler runs.

use gatekeeper::access::AccessControl;
use gatekeeper::config::Config;
use gatekeeper::observability::metrics::init_metrics_recorder;
use gatekeeper::roles::{
    HttpTagRoleSource, RestRoleStore, RoleStore, StaticRoleStore, StaticTagRoleSource,
    TagRoleSource,
};
use gatekeeper::routes::{self, route_table, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=debug,gk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatekeeper");

    // Initialize Prometheus metrics recorder before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        enabled = config.enabled,
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url,
        jwks_cache_ttl_seconds = config.jwks_cache_ttl_seconds,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    if !config.enabled {
        warn!("AUTH_ENABLED=false: requests will not be checked");
    }

    let role_store = build_role_store(&config)?;
    let tag_source = build_tag_source(&config)?;

    let access = Arc::new(AccessControl::from_config(&config, tag_source, role_store));

    // Directory must be populated before the first request
    let entries = access.reload(&route_table()).await.map_err(|e| {
        error!("Failed to load route directory: {}", e);
        e
    })?;
    info!(routes = entries.len(), "Route directory loaded");

    let bind_address = config.bind_address.clone();

    // Create application state
    let state = Arc::new(AppState {
        config,
        access,
        metrics_handle,
    });

    // Build application routes
    let app = routes::build_routes(state);

    // Parse bind address
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Gatekeeper listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gatekeeper shutdown complete");

    Ok(())
}

/// Subject roles come from the identity provider's REST API when a service
/// key is configured, otherwise from an empty in-memory store.
fn build_role_store(config: &Config) -> Result<Arc<dyn RoleStore>, url::ParseError> {
    match &config.idp_service_key {
        Some(service_key) => {
            let store = RestRoleStore::new(
                &config.idp_url,
                service_key.clone(),
                config.upstream_timeout(),
            )?;
            info!("Using identity provider role store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("IDP_SERVICE_KEY not set: no subject holds any role, only public routes are reachable");
            Ok(Arc::new(StaticRoleStore::new()))
        }
    }
}

/// Tag mappings come from `ROLE_TAG_URL` when set, otherwise from a built-in
/// mapping covering the demo route tags.
fn build_tag_source(config: &Config) -> Result<Arc<dyn TagRoleSource>, url::ParseError> {
    match &config.role_tag_url {
        Some(url) => {
            let source =
                HttpTagRoleSource::new(url, config.idp_anon_key.clone(), config.upstream_timeout())?;
            info!(url = %url, "Using HTTP tag-role source");
            Ok(Arc::new(source))
        }
        None => {
            let category = config.role_tag_category.as_str();
            let source = StaticTagRoleSource::new()
                .with_tag(category, "authenticated", ["admin", "user"])
                .with_tag(category, "admin", ["admin"])
                .with_tag(category, "users", ["admin", "user"]);
            info!("Using built-in tag-role mapping");
            Ok(Arc::new(source))
        }
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("GK_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GK_DRAIN_SECONDS=0)");
    }
}
