//! Metrics definitions for Gatekeeper.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gk_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: 4 values (allow, unauthenticated, forbidden, not_found)
//! - `reason`: bounded by `AuthError` variants plus `none`
//! - `status`: 2 values (success, error)
//! - `source`: 2 values (store, cache)
//!
//! Subject ids, paths and key ids are never used as labels.

use crate::errors::AuthError;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Upstream fetches are bounded by the upstream timeout (default 2s)
        .set_buckets_for_metric(
            Matcher::Prefix("gk_jwks_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gk_role_lookup".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set role lookup buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Access Decision Metrics
// ============================================================================

/// Record a terminal access decision
///
/// Metric: `gk_access_decisions_total`
/// Labels: `outcome`, `reason`
pub fn record_access_decision(outcome: &'static str, reason: Option<AuthError>) {
    counter!("gk_access_decisions_total",
        "outcome" => outcome,
        "reason" => reason.map_or("none", |r| r.as_label())
    )
    .increment(1);
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a JWKS fetch attempt
///
/// Metric: `gk_jwks_fetch_total`, `gk_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("gk_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("gk_jwks_fetch_total",
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Role Metrics
// ============================================================================

/// Record a subject role lookup
///
/// Metric: `gk_role_lookups_total`, `gk_role_lookup_duration_seconds`
/// Labels: `source`, `status`
///
/// Cache hits record no duration.
pub fn record_role_lookup(source: &'static str, status: &'static str, duration: Option<Duration>) {
    if let Some(duration) = duration {
        histogram!("gk_role_lookup_duration_seconds").record(duration.as_secs_f64());
    }

    counter!("gk_role_lookups_total",
        "source" => source,
        "status" => status
    )
    .increment(1);
}

/// Record a tag map load
///
/// Metric: `gk_tag_map_loads_total`
/// Labels: `status`
pub fn record_tag_map_load(status: &'static str) {
    counter!("gk_tag_map_loads_total",
        "status" => status
    )
    .increment(1);
}
