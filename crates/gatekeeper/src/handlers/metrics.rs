//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is public so Prometheus can scrape it. Metric labels are
//! bounded and carry no subject ids, paths or tokens.

use crate::routes::AppState;
use axum::{extract::State, response::IntoResponse};
use std::sync::Arc;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE gk_access_decisions_total counter
/// gk_access_decisions_total{outcome="allow",reason="none"} 42
/// ```
#[tracing::instrument(skip_all, name = "gk.metrics.scrape")]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics_handle.render()
}
