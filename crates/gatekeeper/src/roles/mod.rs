//! Role resolution for routes and subjects.
//!
//! [`RoleResolver`] answers two questions:
//!
//! - Which roles may call a route, given its tags
//!   ([`RoleResolver::roles_for_tags`]). The tag map is loaded from a
//!   [`TagRoleSource`] on first use and kept until
//!   [`RoleResolver::invalidate`]. There is no TTL.
//! - Which roles a subject holds ([`RoleResolver::roles_for_subject`]), from
//!   a [`RoleStore`], cached per subject for a short TTL.
//!
//! Subject lookups never fail into the request path: an unreachable store
//! yields the empty set, which denies access. A failed tag map load is
//! reported to the caller, which keeps its previous route snapshot.

pub mod store;

pub use store::{
    HttpTagRoleSource, RestRoleStore, RoleStore, StaticRoleStore, StaticTagRoleSource,
    TagRoleMap, TagRoleSource,
};

use crate::errors::AuthError;
use crate::observability::metrics;
use arc_swap::ArcSwapOption;
use lru::LruCache;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// Default tag map category.
pub const DEFAULT_TAG_CATEGORY: &str = "route_tags";

/// Default subject role cache TTL in seconds.
pub const DEFAULT_ROLE_CACHE_TTL_SECONDS: u64 = 60;

/// Default number of subjects kept in the role cache.
pub const DEFAULT_SUBJECT_CACHE_CAPACITY: usize = 10_000;

/// True iff `allowed_roles` is non-empty and shares a role with `subject_roles`.
///
/// An empty `allowed_roles` always denies.
pub fn check_access(subject_roles: &BTreeSet<String>, allowed_roles: &BTreeSet<String>) -> bool {
    !allowed_roles.is_empty() && !subject_roles.is_disjoint(allowed_roles)
}

/// Union of the roles `map` assigns to each tag. Unknown tags add nothing.
pub fn union_roles(map: &TagRoleMap, tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .filter_map(|tag| map.get(tag))
        .flatten()
        .cloned()
        .collect()
}

/// Resolver tuning.
#[derive(Debug, Clone)]
pub struct RoleSettings {
    /// Category passed to the tag source.
    pub tag_category: String,

    /// Subject role cache TTL; zero disables the cache.
    pub role_cache_ttl: Duration,

    /// Upper bound on a single backend call.
    pub upstream_timeout: Duration,

    /// Maximum cached subjects.
    pub subject_cache_capacity: usize,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            tag_category: DEFAULT_TAG_CATEGORY.to_string(),
            role_cache_ttl: Duration::from_secs(DEFAULT_ROLE_CACHE_TTL_SECONDS),
            upstream_timeout: Duration::from_secs(2),
            subject_cache_capacity: DEFAULT_SUBJECT_CACHE_CAPACITY,
        }
    }
}

struct CachedRoles {
    roles: BTreeSet<String>,
    fetched_at: Instant,
}

pub struct RoleResolver {
    tag_source: Arc<dyn TagRoleSource>,
    role_store: Arc<dyn RoleStore>,
    settings: RoleSettings,

    /// Loaded tag map; `None` until first use or after `invalidate`.
    tag_map: ArcSwapOption<TagRoleMap>,

    /// `None` when the role cache TTL is zero.
    subject_cache: Option<Mutex<LruCache<String, CachedRoles>>>,
}

impl RoleResolver {
    pub fn new(
        tag_source: Arc<dyn TagRoleSource>,
        role_store: Arc<dyn RoleStore>,
        settings: RoleSettings,
    ) -> Self {
        let subject_cache = if settings.role_cache_ttl.is_zero() {
            None
        } else {
            let capacity = NonZeroUsize::new(settings.subject_cache_capacity)
                .unwrap_or(NonZeroUsize::MIN);
            Some(Mutex::new(LruCache::new(capacity)))
        };

        Self {
            tag_source,
            role_store,
            settings,
            tag_map: ArcSwapOption::empty(),
            subject_cache,
        }
    }

    /// Union of the roles mapped to each tag, loading the tag map if needed.
    pub async fn roles_for_tags(&self, tags: &[String]) -> Result<BTreeSet<String>, AuthError> {
        let map = self.tag_map().await?;
        Ok(union_roles(&map, tags))
    }

    /// Roles held by `subject_id`; empty if unknown or the store is unreachable.
    #[instrument(skip_all)]
    pub async fn roles_for_subject(&self, subject_id: &str) -> BTreeSet<String> {
        if let Some(roles) = self.cached_roles(subject_id) {
            metrics::record_role_lookup("cache", "success", None);
            return roles;
        }

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.settings.upstream_timeout,
            self.role_store.roles_for(subject_id),
        )
        .await
        .unwrap_or_else(|_| {
            tracing::warn!(target: "gk.roles", "Role store lookup timed out");
            Err(AuthError::UpstreamUnavailable)
        });

        match result {
            Ok(roles) => {
                metrics::record_role_lookup("store", "success", Some(start.elapsed()));
                self.remember_roles(subject_id, &roles);
                roles
            }
            Err(e) => {
                metrics::record_role_lookup("store", "error", Some(start.elapsed()));
                tracing::warn!(target: "gk.roles", error = %e, "Role lookup failed, treating subject as roleless");
                BTreeSet::new()
            }
        }
    }

    /// Drop the tag map; the next use reloads it.
    pub fn invalidate(&self) {
        self.tag_map.store(None);
        tracing::info!(target: "gk.roles", "Tag map invalidated");
    }

    /// The tag map, loading it from the source if not already held.
    ///
    /// A failed load is not cached; the next call tries again.
    pub async fn tag_map(&self) -> Result<Arc<TagRoleMap>, AuthError> {
        if let Some(map) = self.tag_map.load_full() {
            return Ok(map);
        }

        let category = &self.settings.tag_category;
        let loaded = tokio::time::timeout(
            self.settings.upstream_timeout,
            self.tag_source.load(category),
        )
        .await
        .unwrap_or(Err(AuthError::UpstreamUnavailable));

        match loaded {
            Ok(map) => {
                metrics::record_tag_map_load("success");
                tracing::info!(target: "gk.roles", category = %category, tags = map.len(), "Tag map loaded");
                let map = Arc::new(map);
                self.tag_map.store(Some(Arc::clone(&map)));
                Ok(map)
            }
            Err(e) => {
                metrics::record_tag_map_load("error");
                tracing::error!(target: "gk.roles", category = %category, error = %e, "Failed to load tag map");
                Err(e)
            }
        }
    }

    fn cached_roles(&self, subject_id: &str) -> Option<BTreeSet<String>> {
        let cache = self.subject_cache.as_ref()?;
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);

        let fresh = cache
            .get(subject_id)
            .map(|entry| entry.fetched_at.elapsed() < self.settings.role_cache_ttl)?;
        if fresh {
            return cache.get(subject_id).map(|entry| entry.roles.clone());
        }

        cache.pop(subject_id);
        None
    }

    fn remember_roles(&self, subject_id: &str, roles: &BTreeSet<String>) {
        if let Some(cache) = &self.subject_cache {
            cache.lock().unwrap_or_else(PoisonError::into_inner).put(
                subject_id.to_string(),
                CachedRoles {
                    roles: roles.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
    }
}
