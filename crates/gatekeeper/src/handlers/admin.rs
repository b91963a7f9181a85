//! Operator endpoints.
//!
//! All routes here are tagged `admin` in the route table.

use crate::errors::GkError;
use crate::models::{DashboardResponse, KeySetSummary, ReloadResponse, RouteSummary};
use crate::routes::{route_table, AppState};
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /admin/dashboard
///
/// Shows the route directory with resolved roles and the key set cache state.
#[instrument(skip_all, name = "gk.handlers.admin_dashboard")]
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardResponse> {
    let directory = state.access.directory();
    let routes = directory
        .entries()
        .iter()
        .map(|entry| RouteSummary {
            method: entry.method.clone(),
            path_template: entry.path_template.clone(),
            name: entry.name.clone(),
            tags: entry.tags.clone(),
            allowed_roles: entry.allowed_roles.clone(),
        })
        .collect();

    let stats = state.access.verifier().key_set().stats().await;

    Json(DashboardResponse {
        routes,
        lookup_cache_len: directory.stats().lookup_cache_len,
        key_set: KeySetSummary {
            key_count: stats.key_count,
            age_seconds: stats.age.map(|age| age.as_secs()),
            fetch_count: stats.fetch_count,
            fetch_failures: stats.fetch_failures,
        },
    })
}

/// Handler for POST /admin/reload
///
/// Reloads the tag map and rebuilds the route directory. If the tag map
/// cannot be loaded the previous directory stays active.
#[instrument(skip_all, name = "gk.handlers.reload_routes")]
pub async fn reload_routes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, GkError> {
    let entries = state
        .access
        .reload(&route_table())
        .await
        .map_err(|e| GkError::Internal(format!("route reload failed: {e}")))?;
    tracing::info!(target: "gk.handlers.admin", routes = entries.len(), "Route directory reloaded by operator");

    Ok(Json(ReloadResponse {
        reloaded: entries.len(),
    }))
}

/// Handler for POST /admin/keys/refresh
///
/// Refetches the identity provider's key set.
#[instrument(skip_all, name = "gk.handlers.refresh_keys")]
pub async fn refresh_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, GkError> {
    let key_count = state
        .access
        .verifier()
        .key_set()
        .force_refresh()
        .await
        .map_err(|e| GkError::Internal(format!("key set refresh failed: {e}")))?;

    Ok(Json(ReloadResponse {
        reloaded: key_count,
    }))
}
