//! Gatekeeper response models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Health check response.
///
/// Returned by the `/v1/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status.
    pub status: String,

    /// Whether access control is enforced.
    pub auth_enabled: bool,

    /// Declared routes in the current directory snapshot.
    pub routes: usize,
}

/// Response for `/v1/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub sub: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub roles: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// One declared route as shown on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    pub method: String,
    pub path_template: String,
    pub name: String,
    pub tags: Vec<String>,
    pub allowed_roles: BTreeSet<String>,
}

/// Key set cache figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySetSummary {
    pub key_count: usize,
    pub age_seconds: Option<u64>,
    pub fetch_count: u64,
    pub fetch_failures: u64,
}

/// Response for `/admin/dashboard`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub routes: Vec<RouteSummary>,
    pub lookup_cache_len: usize,
    pub key_set: KeySetSummary,
}

/// Response for `/users/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,

    /// Whether the caller asked about themselves.
    pub is_self: bool,
}

/// Response for the admin reload endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub reloaded: usize,
}
