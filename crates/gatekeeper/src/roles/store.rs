//! Backends for role data.
//!
//! Two lookups feed the [`RoleResolver`](super::RoleResolver):
//!
//! - [`TagRoleSource`] - per category, which roles each route tag admits
//! - [`RoleStore`] - which roles a subject holds
//!
//! Each has an in-memory implementation (tests, demo binary) and an HTTP one
//! against the identity provider's REST surface. HTTP failures of any kind
//! surface as `AuthError::UpstreamUnavailable`; the resolver decides how to
//! degrade.

use crate::errors::AuthError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::instrument;

/// Tag to the set of roles that tag admits.
pub type TagRoleMap = HashMap<String, BTreeSet<String>>;

/// Source of the tag-to-role mapping.
#[async_trait]
pub trait TagRoleSource: Send + Sync {
    /// Load the full mapping for `category`.
    async fn load(&self, category: &str) -> Result<TagRoleMap, AuthError>;
}

/// Source of subject role assignments.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Roles held by `subject_id`. Unknown subjects have no roles.
    async fn roles_for(&self, subject_id: &str) -> Result<BTreeSet<String>, AuthError>;
}

fn role_set<I, S>(roles: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    roles.into_iter().map(Into::into).collect()
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// Fixed subject role assignments.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleStore {
    roles: HashMap<String, BTreeSet<String>>,
}

impl StaticRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `roles` to `subject_id`, replacing any earlier grant.
    pub fn with_subject<I, S>(mut self, subject_id: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(subject_id.to_string(), role_set(roles));
        self
    }
}

#[async_trait]
impl RoleStore for StaticRoleStore {
    async fn roles_for(&self, subject_id: &str) -> Result<BTreeSet<String>, AuthError> {
        Ok(self.roles.get(subject_id).cloned().unwrap_or_default())
    }
}

/// Fixed tag mappings, keyed by category.
#[derive(Debug, Clone, Default)]
pub struct StaticTagRoleSource {
    categories: HashMap<String, TagRoleMap>,
}

impl StaticTagRoleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `tag` in `category` to `roles`.
    pub fn with_tag<I, S>(mut self, category: &str, tag: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(tag.to_string(), role_set(roles));
        self
    }
}

#[async_trait]
impl TagRoleSource for StaticTagRoleSource {
    async fn load(&self, category: &str) -> Result<TagRoleMap, AuthError> {
        Ok(self.categories.get(category).cloned().unwrap_or_default())
    }
}

// ============================================================================
// HTTP implementations
// ============================================================================

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "gk.roles", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

fn upstream_error(context: &'static str) -> impl Fn(reqwest::Error) -> AuthError {
    move |e| {
        tracing::warn!(target: "gk.roles", error = %e, context, "Role backend request failed");
        AuthError::UpstreamUnavailable
    }
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: String,
}

/// Reads role assignments from the identity provider's REST API.
///
/// Issues `GET {base}/rest/v1/user_roles?user_id=eq.{id}&select=role` with
/// the service key as both `apikey` and bearer, and expects a JSON array of
/// `{"role": "..."}` rows.
pub struct RestRoleStore {
    endpoint: url::Url,
    service_key: SecretString,
    http_client: reqwest::Client,
}

impl RestRoleStore {
    /// # Errors
    ///
    /// Returns `url::ParseError` if `base_url` is not a valid URL.
    pub fn new(
        base_url: &str,
        service_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let endpoint =
            url::Url::parse(&format!("{}/rest/v1/user_roles", base_url.trim_end_matches('/')))?;
        Ok(Self {
            endpoint,
            service_key,
            http_client: http_client(timeout),
        })
    }
}

#[async_trait]
impl RoleStore for RestRoleStore {
    #[instrument(skip_all)]
    async fn roles_for(&self, subject_id: &str) -> Result<BTreeSet<String>, AuthError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{subject_id}"))
            .append_pair("select", "role");

        let key = self.service_key.expose_secret();
        let response = self
            .http_client
            .get(url)
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await
            .map_err(upstream_error("user_roles request"))?;

        if !response.status().is_success() {
            tracing::warn!(target: "gk.roles", status = %response.status(), "Role store returned error");
            return Err(AuthError::UpstreamUnavailable);
        }

        let rows: Vec<RoleRow> = response
            .json()
            .await
            .map_err(upstream_error("user_roles body"))?;

        Ok(rows.into_iter().map(|row| row.role).collect())
    }
}

/// Loads tag mappings from an HTTP endpoint.
///
/// Issues `GET {url}?category={category}` and expects a JSON object of
/// `{"tag": ["role", ...]}`.
pub struct HttpTagRoleSource {
    url: url::Url,
    api_key: Option<SecretString>,
    http_client: reqwest::Client,
}

impl HttpTagRoleSource {
    /// # Errors
    ///
    /// Returns `url::ParseError` if `url` is not a valid URL.
    pub fn new(
        url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: url::Url::parse(url)?,
            api_key,
            http_client: http_client(timeout),
        })
    }
}

#[async_trait]
impl TagRoleSource for HttpTagRoleSource {
    #[instrument(skip(self))]
    async fn load(&self, category: &str) -> Result<TagRoleMap, AuthError> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("category", category);

        let mut request = self.http_client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(upstream_error("tag map request"))?;

        if !response.status().is_success() {
            tracing::warn!(target: "gk.roles", status = %response.status(), "Tag map source returned error");
            return Err(AuthError::UpstreamUnavailable);
        }

        let raw: HashMap<String, Vec<String>> = response
            .json()
            .await
            .map_err(upstream_error("tag map body"))?;

        Ok(raw
            .into_iter()
            .map(|(tag, roles)| (tag, role_set(roles)))
            .collect())
    }
}
