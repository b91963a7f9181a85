//! Route directory: declared routes and their access metadata.
//!
//! [`RouteDirectory::refresh`] compiles the route table into an immutable
//! snapshot and swaps it in atomically. [`RouteDirectory::find`] maps a
//! concrete request (`GET /users/42`) to the declared entry
//! (`GET /users/{id}`), trying templates in route-table order so the first
//! full match wins. A `HEAD` request with no `HEAD` entry of its own is
//! matched against the `GET` entries.
//!
//! Lookups are memoized per snapshot in a bounded LRU keyed by the concrete
//! `(method, path)`, misses included. The memo lives inside the snapshot, so
//! a refresh discards it together with the routes it indexes.

pub mod pattern;

pub use pattern::{normalize_path, PathPattern, PatternError};

use crate::errors::AuthError;
use crate::roles::{union_roles, RoleResolver};
use arc_swap::ArcSwap;
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;

/// Default capacity of the lookup memo.
pub const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 4096;

/// A route as declared by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: String,
    pub path_template: String,
    pub name: String,
    pub tags: Vec<String>,
}

impl RouteSpec {
    pub fn new(method: &str, path_template: &str, name: &str, tags: &[&str]) -> Self {
        Self {
            method: method.to_string(),
            path_template: path_template.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A declared route with its resolved access metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Uppercase HTTP method.
    pub method: String,

    /// Normalized path template.
    pub path_template: String,

    pub name: String,

    /// Tags in declaration order.
    pub tags: Vec<String>,

    /// Roles admitted by the tags. Empty means nobody.
    pub allowed_roles: BTreeSet<String>,
}

impl RouteEntry {
    /// `METHOD /template`, unique within a snapshot.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Point-in-time directory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    pub routes: usize,
    pub lookup_cache_len: usize,
}

struct CompiledRoute {
    entry: Arc<RouteEntry>,
    pattern: PathPattern,
}

struct Snapshot {
    routes: Vec<CompiledRoute>,

    /// `(method, normalized path)` to index in `routes`, or `None` for a miss.
    lookups: Mutex<LruCache<(String, String), Option<usize>>>,
}

impl Snapshot {
    fn new(routes: Vec<CompiledRoute>, capacity: NonZeroUsize) -> Self {
        Self {
            routes,
            lookups: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn position(&self, method: &str, path: &str) -> Option<usize> {
        self.routes
            .iter()
            .position(|route| route.entry.method == method && route.pattern.matches(path))
    }

    fn entry_at(&self, index: Option<usize>) -> Option<Arc<RouteEntry>> {
        index
            .and_then(|i| self.routes.get(i))
            .map(|route| Arc::clone(&route.entry))
    }
}

pub struct RouteDirectory {
    snapshot: ArcSwap<Snapshot>,
    capacity: NonZeroUsize,
}

impl Default for RouteDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_CACHE_CAPACITY)
    }
}

impl RouteDirectory {
    /// Create an empty directory whose lookup memo holds `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::new(Vec::new(), capacity)),
            capacity,
        }
    }

    /// Rebuild the directory from `route_table`, replacing the current snapshot.
    ///
    /// Each route's `allowed_roles` is resolved from its tags through the tag
    /// map, loaded once per refresh. If that load fails the current snapshot
    /// stays in place and the error is returned.
    ///
    /// Routes with an empty method or an invalid template are skipped, as are
    /// later duplicates of a `METHOD /template` key.
    #[instrument(skip_all, fields(routes = route_table.len()))]
    pub async fn refresh(
        &self,
        route_table: &[RouteSpec],
        roles: &RoleResolver,
    ) -> Result<Vec<RouteEntry>, AuthError> {
        let tag_map = roles.tag_map().await.map_err(|e| {
            tracing::error!(
                target: "gk.directory",
                error = %e,
                routes = self.snapshot.load().routes.len(),
                "Tag map unavailable, keeping current route directory"
            );
            e
        })?;

        let mut compiled: Vec<CompiledRoute> = Vec::with_capacity(route_table.len());
        let mut seen: HashMap<String, &str> = HashMap::new();

        for spec in route_table {
            let method = spec.method.trim().to_ascii_uppercase();
            if method.is_empty() {
                tracing::error!(target: "gk.directory", route = %spec.name, "Skipping route with empty method");
                continue;
            }

            let pattern = match PathPattern::parse(&spec.path_template) {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::error!(
                        target: "gk.directory",
                        route = %spec.name,
                        template = %spec.path_template,
                        error = %e,
                        "Skipping route with invalid template"
                    );
                    continue;
                }
            };

            let key = format!("{method} {}", pattern.template());
            if let Some(first) = seen.get(&key) {
                tracing::warn!(
                    target: "gk.directory",
                    key = %key,
                    route = %spec.name,
                    kept = %first,
                    "Duplicate route declaration ignored"
                );
                continue;
            }
            seen.insert(key, &spec.name);

            let allowed_roles = union_roles(&tag_map, &spec.tags);
            let entry = RouteEntry {
                method,
                path_template: pattern.template().to_string(),
                name: spec.name.clone(),
                tags: spec.tags.clone(),
                allowed_roles,
            };

            compiled.push(CompiledRoute {
                entry: Arc::new(entry),
                pattern,
            });
        }

        let entries: Vec<RouteEntry> = compiled
            .iter()
            .map(|route| route.entry.as_ref().clone())
            .collect();

        self.snapshot
            .store(Arc::new(Snapshot::new(compiled, self.capacity)));

        tracing::info!(
            target: "gk.directory",
            routes = entries.len(),
            skipped = route_table.len().saturating_sub(entries.len()),
            "Route directory refreshed"
        );

        Ok(entries)
    }

    /// Find the entry whose template matches a concrete request.
    pub fn find(&self, method: &str, path: &str) -> Option<Arc<RouteEntry>> {
        let snapshot = self.snapshot.load();
        let method = method.to_ascii_uppercase();
        let path = normalize_path(path);
        let memo_key = (method, path.to_string());

        let cached = snapshot
            .lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&memo_key)
            .copied();
        if let Some(index) = cached {
            return snapshot.entry_at(index);
        }

        let index = snapshot.position(&memo_key.0, path).or_else(|| {
            (memo_key.0 == "HEAD")
                .then(|| snapshot.position("GET", path))
                .flatten()
        });

        if index.is_none() {
            tracing::debug!(target: "gk.directory", method = %memo_key.0, "No route matches request");
        }

        snapshot
            .lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(memo_key, index);

        snapshot.entry_at(index)
    }

    /// All entries in route-table order.
    pub fn entries(&self) -> Vec<Arc<RouteEntry>> {
        self.snapshot
            .load()
            .routes
            .iter()
            .map(|route| Arc::clone(&route.entry))
            .collect()
    }

    pub fn stats(&self) -> DirectoryStats {
        let snapshot = self.snapshot.load();
        let lookup_cache_len = snapshot
            .lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        DirectoryStats {
            routes: snapshot.routes.len(),
            lookup_cache_len,
        }
    }
}
