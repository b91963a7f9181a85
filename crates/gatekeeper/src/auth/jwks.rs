//! Signing key set cache for the identity provider's JWKS.
//!
//! The identity provider publishes its public signing keys as a JSON Web Key
//! Set. [`KeySetCache`] fetches the whole set through a [`KeySource`], keys it
//! by `kid`, and serves lookups from memory until the set goes stale.
//!
//! # Refresh rules
//!
//! - Fresh set and key present: served from memory.
//! - Key present but set stale: refetched when `auto_refresh` is on,
//!   otherwise the stale key is served.
//! - Key absent, or nothing fetched yet: one fetch, one retry of the lookup.
//!
//! A fetch replaces the whole map under the write lock, so readers see either
//! the previous set or the new one. Fetch failures are logged and surface as
//! a missing key; they never reach the request as an error.
//!
//! Concurrent misses each trigger their own fetch. There is no single-flight
//! coordination.

use crate::errors::AuthError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::jwt::decode_jwk_component;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Ed25519 public keys are exactly 32 bytes.
const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("OKP", "RSA" or "EC").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm the key is bound to.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for OKP and EC keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key, or EC x coordinate (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Public key material for one signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Ed25519 public key bytes.
    Okp { x: Vec<u8> },

    /// RSA modulus and exponent, base64url as published.
    Rsa { n: String, e: String },

    /// EC point coordinates, base64url as published.
    Ec { crv: String, x: String, y: String },
}

/// A verification key bound to exactly one algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub key_id: String,
    pub key_type: String,
    pub algorithm: Algorithm,
    pub material: KeyMaterial,
}

impl SigningKey {
    /// Convert a published JWK into a signing key.
    ///
    /// Returns `None` for encryption keys, symmetric or unknown key types,
    /// algorithms that do not fit the key type, and incomplete material.
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                tracing::debug!(target: "gk.auth.jwks", kid = %jwk.kid, key_use = %key_use, "Skipping non-signing key");
                return None;
            }
        }

        let algorithm = match &jwk.alg {
            Some(alg) => Algorithm::from_str(alg).ok()?,
            None => default_algorithm(&jwk.kty, jwk.crv.as_deref())?,
        };

        let material = match (jwk.kty.as_str(), algorithm) {
            ("OKP", Algorithm::EdDSA) => {
                if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                    return None;
                }
                let x = decode_jwk_component(jwk.x.as_deref()?).ok()?;
                if x.len() != ED25519_PUBLIC_KEY_LEN {
                    return None;
                }
                KeyMaterial::Okp { x }
            }
            (
                "RSA",
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => KeyMaterial::Rsa {
                n: jwk.n.clone()?,
                e: jwk.e.clone()?,
            },
            ("EC", Algorithm::ES256 | Algorithm::ES384) => {
                let crv = jwk.crv.clone()?;
                let expected = if algorithm == Algorithm::ES256 {
                    "P-256"
                } else {
                    "P-384"
                };
                if crv != expected {
                    return None;
                }
                KeyMaterial::Ec {
                    crv,
                    x: jwk.x.clone()?,
                    y: jwk.y.clone()?,
                }
            }
            _ => return None,
        };

        Some(Self {
            key_id: jwk.kid.clone(),
            key_type: jwk.kty.clone(),
            algorithm,
            material,
        })
    }

    /// Build a `jsonwebtoken` decoding key from the material.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        let key = match &self.material {
            KeyMaterial::Okp { x } => Ok(DecodingKey::from_ed_der(x)),
            KeyMaterial::Rsa { n, e } => DecodingKey::from_rsa_components(n, e),
            KeyMaterial::Ec { x, y, .. } => DecodingKey::from_ec_components(x, y),
        };

        key.map_err(|e| {
            tracing::warn!(target: "gk.auth.jwks", kid = %self.key_id, error = %e, "Unusable key material");
            AuthError::SignatureInvalid
        })
    }
}

fn default_algorithm(kty: &str, crv: Option<&str>) -> Option<Algorithm> {
    match (kty, crv) {
        ("OKP", Some("Ed25519") | None) => Some(Algorithm::EdDSA),
        ("EC", Some("P-256")) => Some(Algorithm::ES256),
        ("EC", Some("P-384")) => Some(Algorithm::ES384),
        ("RSA", _) => Some(Algorithm::RS256),
        _ => None,
    }
}

/// Where key sets come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the complete published key set.
    async fn fetch(&self) -> Result<Vec<Jwk>, AuthError>;
}

/// Fetches the JWKS document over HTTP.
pub struct HttpKeySource {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a source for `jwks_url` whose requests time out after `timeout`.
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gk.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<Vec<Jwk>, AuthError> {
        tracing::debug!(target: "gk.auth.jwks", "Fetching JWKS from identity provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gk.auth.jwks", error = %e, "Failed to fetch JWKS");
                AuthError::KeyFetchFailure
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gk.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(AuthError::KeyFetchFailure);
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gk.auth.jwks", error = %e, "Failed to parse JWKS response");
            AuthError::KeyFetchFailure
        })?;

        Ok(jwks.keys)
    }
}

/// One fetched key set. Replaced as a unit.
struct CachedKeySet {
    /// Map of key ID to signing key.
    keys: HashMap<String, SigningKey>,

    /// When this set was fetched.
    fetched_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySetStats {
    /// Number of keys in the current set.
    pub key_count: usize,

    /// Time since the current set was fetched; `None` if never fetched.
    pub age: Option<Duration>,

    /// Fetch attempts since construction.
    pub fetch_count: u64,

    /// Failed fetch attempts since construction.
    pub fetch_failures: u64,
}

/// Thread-safe cache of the identity provider's signing keys.
pub struct KeySetCache {
    source: Arc<dyn KeySource>,

    /// Current key set; `None` until the first successful fetch.
    cache: RwLock<Option<Arc<CachedKeySet>>>,

    ttl: Duration,
    auto_refresh: bool,
    fetch_timeout: Duration,

    fetch_count: AtomicU64,
    fetch_failures: AtomicU64,
}

impl KeySetCache {
    /// Create a cache over `source` with the default TTL and auto-refresh on.
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self::with_settings(
            source,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            true,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    /// Create a cache with explicit settings.
    ///
    /// # Arguments
    ///
    /// * `source` - Where key sets are fetched from
    /// * `ttl` - How long a fetched set is fresh
    /// * `auto_refresh` - Refetch stale sets even when the key is cached
    /// * `fetch_timeout` - Upper bound on a single fetch
    pub fn with_settings(
        source: Arc<dyn KeySource>,
        ttl: Duration,
        auto_refresh: bool,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            ttl,
            auto_refresh,
            fetch_timeout,
            fetch_count: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// Get a signing key by key ID.
    ///
    /// Performs at most one fetch. Returns `None` when the key is not in the
    /// set, or when the fetch failed.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Option<SigningKey> {
        if let Some(cached) = self.current().await {
            let fresh = cached.fetched_at.elapsed() < self.ttl;
            match cached.keys.get(kid) {
                Some(key) if fresh || !self.auto_refresh => {
                    tracing::debug!(target: "gk.auth.jwks", fresh, "JWKS cache hit");
                    return Some(key.clone());
                }
                Some(_) => {
                    tracing::debug!(target: "gk.auth.jwks", "JWKS cache stale, refreshing");
                }
                None => {
                    tracing::debug!(target: "gk.auth.jwks", "Key not found in JWKS cache");
                }
            }
        }

        let refreshed = self.refresh().await.ok()?;

        let key = refreshed.keys.get(kid).cloned();
        if key.is_none() {
            tracing::warn!(target: "gk.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        }
        key
    }

    /// Fetch the key set and replace the cache, returning the number of keys.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyFetchFailure` if the fetch fails or times out.
    pub async fn force_refresh(&self) -> Result<usize, AuthError> {
        self.refresh().await.map(|set| set.keys.len())
    }

    /// Drop all cached keys and the fetch timestamp.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        tracing::info!(target: "gk.auth.jwks", "JWKS cache cleared");
    }

    /// Current cache statistics.
    pub async fn stats(&self) -> KeySetStats {
        let current = self.current().await;
        KeySetStats {
            key_count: current.as_ref().map_or(0, |set| set.keys.len()),
            age: current.as_ref().map(|set| set.fetched_at.elapsed()),
            fetch_count: self.fetch_count.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }

    async fn current(&self) -> Option<Arc<CachedKeySet>> {
        self.cache.read().await.clone()
    }

    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<Arc<CachedKeySet>, AuthError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    target: "gk.auth.jwks",
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "JWKS fetch timed out"
                );
                Err(AuthError::KeyFetchFailure)
            }
        };

        let jwks = match result {
            Ok(jwks) => {
                metrics::record_jwks_fetch("success", start.elapsed());
                jwks
            }
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_jwks_fetch("error", start.elapsed());
                return Err(e);
            }
        };

        let published = jwks.len();
        let keys: HashMap<String, SigningKey> = jwks
            .iter()
            .filter_map(SigningKey::from_jwk)
            .map(|key| (key.key_id.clone(), key))
            .collect();

        tracing::info!(
            target: "gk.auth.jwks",
            key_count = keys.len(),
            skipped = published.saturating_sub(keys.len()),
            "JWKS cache refreshed"
        );

        let set = Arc::new(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
        });

        let mut cache = self.cache.write().await;
        *cache = Some(Arc::clone(&set));

        Ok(set)
    }
}
