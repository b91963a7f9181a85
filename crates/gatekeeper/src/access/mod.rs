//! Per-request access decisions.
//!
//! [`AccessControl::decide`] runs the request through, in order:
//!
//! 1. Route lookup in the [`RouteDirectory`] (no match: `NotFound`)
//! 2. Public check (public tag: `Allow` without identity)
//! 3. Token extraction (none found: `Unauthenticated`)
//! 4. Token verification (any failure: `Unauthenticated`)
//! 5. Subject role resolution
//! 6. Authorization (`Forbidden` or `Allow` with an [`AuthContext`])
//!
//! Every failure ends in a [`Decision`]; nothing here returns an error. The
//! specific [`AuthError`] is carried for logs and metrics only.

pub mod extract;

pub use extract::{extract_token, ExtractedToken, TokenSource, TokenSources};

use crate::auth::{AuthContext, HttpKeySource, KeySetCache, KeySource, TokenVerifier};
use crate::config::Config;
use crate::directory::{RouteDirectory, RouteEntry, RouteSpec};
use crate::errors::AuthError;
use crate::observability::metrics;
use crate::roles::{check_access, RoleResolver, RoleSettings, RoleStore, TagRoleSource};
use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of an access check.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Proceed. `None` for public routes.
    Allow(Option<AuthContext>),

    /// No usable credentials.
    Unauthenticated(AuthError),

    /// Valid credentials, insufficient roles.
    Forbidden(AuthError),

    /// No declared route matches.
    NotFound,
}

impl Decision {
    /// Bounded label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allow(_) => "allow",
            Decision::Unauthenticated(_) => "unauthenticated",
            Decision::Forbidden(_) => "forbidden",
            Decision::NotFound => "not_found",
        }
    }

    pub fn reason(&self) -> Option<AuthError> {
        match self {
            Decision::Unauthenticated(reason) | Decision::Forbidden(reason) => Some(*reason),
            Decision::NotFound => Some(AuthError::RouteNotFound),
            Decision::Allow(_) => None,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Request-shape settings for [`AccessControl`].
#[derive(Debug, Clone)]
pub struct AccessSettings {
    pub sources: TokenSources,

    /// Tag that marks a route as public.
    pub public_tag: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            sources: TokenSources::default(),
            public_tag: crate::config::DEFAULT_PUBLIC_TAG.to_string(),
        }
    }
}

/// The access orchestrator. Owns no global state; cheap to share in an `Arc`.
pub struct AccessControl {
    directory: Arc<RouteDirectory>,
    verifier: Arc<TokenVerifier>,
    roles: Arc<RoleResolver>,
    settings: AccessSettings,
}

impl AccessControl {
    pub fn new(
        directory: Arc<RouteDirectory>,
        verifier: Arc<TokenVerifier>,
        roles: Arc<RoleResolver>,
        settings: AccessSettings,
    ) -> Self {
        Self {
            directory,
            verifier,
            roles,
            settings,
        }
    }

    /// Wire the full component graph from configuration.
    ///
    /// The directory starts empty; call [`AccessControl::reload`] with the
    /// route table before serving.
    pub fn from_config(
        config: &Config,
        tag_source: Arc<dyn TagRoleSource>,
        role_store: Arc<dyn RoleStore>,
    ) -> Self {
        let key_source = Arc::new(HttpKeySource::new(
            config.jwks_url.clone(),
            config.upstream_timeout(),
        ));
        Self::from_config_with_key_source(config, key_source, tag_source, role_store)
    }

    /// [`AccessControl::from_config`] with an explicit key source.
    pub fn from_config_with_key_source(
        config: &Config,
        key_source: Arc<dyn KeySource>,
        tag_source: Arc<dyn TagRoleSource>,
        role_store: Arc<dyn RoleStore>,
    ) -> Self {
        let key_set = Arc::new(KeySetCache::with_settings(
            key_source,
            config.jwks_cache_ttl(),
            config.jwks_auto_refresh,
            config.upstream_timeout(),
        ));
        let verifier = Arc::new(TokenVerifier::new(
            key_set,
            config.jwt_audience.clone(),
            config.clock_skew(),
        ));
        let roles = Arc::new(RoleResolver::new(
            tag_source,
            role_store,
            RoleSettings {
                tag_category: config.role_tag_category.clone(),
                role_cache_ttl: config.role_cache_ttl(),
                upstream_timeout: config.upstream_timeout(),
                ..RoleSettings::default()
            },
        ));
        let directory = Arc::new(RouteDirectory::new(config.route_cache_capacity));

        Self::new(
            directory,
            verifier,
            roles,
            AccessSettings {
                sources: TokenSources {
                    alt_header: config.alt_header.clone(),
                    cookie_name: config.cookie_name.clone(),
                    query_param: config.query_param.clone(),
                },
                public_tag: config.public_tag.clone(),
            },
        )
    }

    pub fn directory(&self) -> &Arc<RouteDirectory> {
        &self.directory
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn roles(&self) -> &Arc<RoleResolver> {
        &self.roles
    }

    /// Reload tag mappings and rebuild the directory from `route_table`.
    ///
    /// On failure the previous directory keeps serving.
    pub async fn reload(&self, route_table: &[RouteSpec]) -> Result<Vec<RouteEntry>, AuthError> {
        self.roles.invalidate();
        self.directory.refresh(route_table, &self.roles).await
    }

    /// Decide whether a request may proceed.
    ///
    /// `query` is the raw query string, without the leading `?`.
    #[instrument(skip_all, fields(method = %method))]
    pub async fn decide(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Decision {
        let decision = self.evaluate(method, path, headers, query).await;

        metrics::record_access_decision(decision.outcome(), decision.reason());
        match &decision {
            Decision::Allow(_) => {
                tracing::debug!(target: "gk.access", outcome = decision.outcome(), "Access granted");
            }
            Decision::NotFound => {
                tracing::debug!(target: "gk.access", outcome = decision.outcome(), "No route for request");
            }
            Decision::Unauthenticated(reason) | Decision::Forbidden(reason) => {
                tracing::info!(
                    target: "gk.access",
                    outcome = decision.outcome(),
                    reason = reason.as_label(),
                    "Access denied"
                );
            }
        }

        decision
    }

    async fn evaluate(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Decision {
        // Route lookup
        let Some(entry) = self.directory.find(method, path) else {
            return Decision::NotFound;
        };

        // Public check
        if entry.has_tag(&self.settings.public_tag) {
            return Decision::Allow(None);
        }

        // Token extraction
        let Some(extracted) = extract_token(headers, query, &self.settings.sources) else {
            return Decision::Unauthenticated(AuthError::MissingToken);
        };

        // Token verification
        let verified = match self.verifier.verify(&extracted.token).await {
            Ok(verified) => verified,
            Err(reason) => return Decision::Unauthenticated(reason),
        };

        // Role resolution
        let subject_roles = self.roles.roles_for_subject(&verified.subject_id).await;

        // Authorization
        if !check_access(&subject_roles, &entry.allowed_roles) {
            tracing::debug!(
                target: "gk.access",
                route = %entry.name,
                "Subject holds none of the allowed roles"
            );
            return Decision::Forbidden(AuthError::InsufficientRole);
        }

        Decision::Allow(Some(AuthContext::new(
            verified,
            &extracted.token,
            subject_roles,
        )))
    }
}
