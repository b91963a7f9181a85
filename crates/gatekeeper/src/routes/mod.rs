//! HTTP routes for the Gatekeeper demo service.
//!
//! Every handler is declared once, together with its access tags. The same
//! declaration list feeds the axum router and the route directory, so a route
//! cannot be served without also being declared.

use crate::access::AccessControl;
use crate::config::Config;
use crate::directory::RouteSpec;
use crate::handlers;
use crate::middleware::{enforce_access, AccessState};
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Access decision pipeline.
    pub access: Arc<AccessControl>,

    /// Prometheus metrics handle for the `/metrics` endpoint.
    pub metrics_handle: PrometheusHandle,
}

type Declaration = (RouteSpec, MethodRouter<Arc<AppState>>);

fn declarations() -> Vec<Declaration> {
    vec![
        (
            RouteSpec::new("GET", "/v1/health", "health", &["public"]),
            get(handlers::health_check),
        ),
        (
            RouteSpec::new("GET", "/metrics", "metrics", &["public"]),
            get(handlers::metrics_handler),
        ),
        (
            RouteSpec::new("GET", "/v1/me", "get_me", &["authenticated"]),
            get(handlers::get_me),
        ),
        (
            RouteSpec::new("GET", "/admin/dashboard", "admin_dashboard", &["admin"]),
            get(handlers::dashboard),
        ),
        (
            RouteSpec::new("POST", "/admin/reload", "reload_routes", &["admin"]),
            post(handlers::reload_routes),
        ),
        (
            RouteSpec::new("POST", "/admin/keys/refresh", "refresh_keys", &["admin"]),
            post(handlers::refresh_keys),
        ),
        (
            RouteSpec::new("GET", "/users/{id}", "get_user", &["users"]),
            get(handlers::get_user),
        ),
    ]
}

/// The declared route table, in router order.
pub fn route_table() -> Vec<RouteSpec> {
    declarations().into_iter().map(|(spec, _)| spec).collect()
}

/// Convert a `{param}` / `{*rest}` template to axum's `:param` / `*rest`.
fn axum_path(template: &str) -> String {
    template
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) if inner.starts_with('*') => inner.to_string(),
            Some(inner) => format!(":{inner}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - Every declared route from [`route_table`]
/// - A JSON 404 fallback
/// - Access enforcement on all of the above
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    let access_state = AccessState {
        access: Arc::clone(&state.access),
        enabled: state.config.enabled,
    };

    let mut router = Router::new();
    for (spec, handler) in declarations() {
        router = router.route(&axum_path(&spec.path_template), handler);
    }

    // Apply global middleware layers
    // Request order (last added runs first):
    // 1. TimeoutLayer - Bound the whole request
    // 2. TraceLayer - Log request details
    // 3. enforce_access - Decide before any handler runs, fallback included
    router
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            access_state,
            enforce_access,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
