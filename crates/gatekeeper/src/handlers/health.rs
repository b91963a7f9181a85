//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/health
///
/// Public. Reports whether access control is on and how many routes the
/// directory holds. Makes no upstream calls.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "auth_enabled": true,
///   "routes": 7
/// }
/// ```
#[instrument(skip_all, name = "gk.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        auth_enabled: state.config.enabled,
        routes: state.access.directory().stats().routes,
    })
}
