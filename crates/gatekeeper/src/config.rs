//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables. Identity-provider keys
//! are held as `SecretString` and redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default key-set cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default subject-role cache TTL in seconds.
pub const DEFAULT_ROLE_CACHE_TTL_SECONDS: u64 = 60;

/// Default timeout for identity-provider and role-store calls.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 2000;

/// Upper bound for upstream timeouts. Kept below the 30s request timeout.
pub const MAX_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

/// Default capacity of the (method, path) → route lookup cache.
pub const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 4096;

/// Path of the JWKS document relative to the identity-provider base URL.
pub const DEFAULT_JWKS_PATH: &str = "/auth/v1/.well-known/jwks.json";

/// Default alternate header carrying a bearer token.
pub const DEFAULT_ALT_HEADER: &str = "x-access-token";

/// Default cookie carrying a bearer token.
pub const DEFAULT_COOKIE_NAME: &str = "access_token";

/// Default query parameter carrying a bearer token.
pub const DEFAULT_QUERY_PARAM: &str = "access_token";

/// Default sentinel tag that marks a route as public.
pub const DEFAULT_PUBLIC_TAG: &str = "public";

/// Default category identifier for the tag → role mapping.
pub const DEFAULT_ROLE_TAG_CATEGORY: &str = "route_tags";

/// Gatekeeper configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Whether access control is enforced at all.
    pub enabled: bool,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Identity-provider base URL.
    pub idp_url: String,

    /// Identity-provider anonymous (public) key.
    pub idp_anon_key: Option<SecretString>,

    /// Identity-provider service key, used for role-store lookups.
    pub idp_service_key: Option<SecretString>,

    /// URL of the JWKS document.
    pub jwks_url: String,

    /// Expected `aud` claim. `None` disables the audience check.
    pub jwt_audience: Option<String>,

    /// How long a fetched key set is considered fresh.
    pub jwks_cache_ttl_seconds: u64,

    /// Refetch the key set when it goes stale, even if the key is cached.
    pub jwks_auto_refresh: bool,

    /// How long a subject's roles are cached (0 disables caching).
    pub role_cache_ttl_seconds: u64,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: i64,

    /// Timeout for each identity-provider or role-store call.
    pub upstream_timeout_ms: u64,

    /// Capacity of the route lookup cache.
    pub route_cache_capacity: usize,

    /// Alternate header consulted after `Authorization`.
    pub alt_header: String,

    /// Cookie consulted after the alternate header.
    pub cookie_name: String,

    /// Query parameter consulted last.
    pub query_param: String,

    /// Tag that marks a route as public.
    pub public_tag: String,

    /// Category identifier passed to the tag → role source.
    pub role_tag_category: String,

    /// HTTP tag map endpoint; the built-in demo mapping is used when unset.
    pub role_tag_url: Option<String>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enabled", &self.enabled)
            .field("bind_address", &self.bind_address)
            .field("idp_url", &self.idp_url)
            .field("idp_anon_key", &self.idp_anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "idp_service_key",
                &self.idp_service_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwks_url", &self.jwks_url)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("jwks_auto_refresh", &self.jwks_auto_refresh)
            .field("role_cache_ttl_seconds", &self.role_cache_ttl_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .field("route_cache_capacity", &self.route_cache_capacity)
            .field("alt_header", &self.alt_header)
            .field("cookie_name", &self.cookie_name)
            .field("query_param", &self.query_param)
            .field("public_tag", &self.public_tag)
            .field("role_tag_category", &self.role_tag_category)
            .field("role_tag_url", &self.role_tag_url)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid URL configuration: {0}")]
    InvalidUrl(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),

    #[error("Invalid upstream timeout configuration: {0}")]
    InvalidUpstreamTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let enabled = parse_bool(vars, "AUTH_ENABLED", true)?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let idp_url = vars
            .get("IDP_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("IDP_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();
        validate_http_url("IDP_URL", &idp_url)?;

        let jwks_url = vars
            .get("JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("{}{}", idp_url, DEFAULT_JWKS_PATH));
        validate_http_url("JWKS_URL", &jwks_url)?;

        let idp_anon_key = non_empty(vars, "IDP_ANON_KEY").map(SecretString::from);
        let idp_service_key = non_empty(vars, "IDP_SERVICE_KEY").map(SecretString::from);
        let jwt_audience = non_empty(vars, "JWT_AUDIENCE");

        let jwks_cache_ttl_seconds = if let Some(value_str) = vars.get("JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCache(
                    "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_JWKS_CACHE_TTL_SECONDS
        };

        let jwks_auto_refresh = parse_bool(vars, "JWKS_AUTO_REFRESH", true)?;

        // Zero is allowed here: it turns the subject-role cache off
        let role_cache_ttl_seconds = match vars.get("ROLE_CACHE_TTL_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "ROLE_CACHE_TTL_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_ROLE_CACHE_TTL_SECONDS,
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let upstream_timeout_ms = if let Some(value_str) = vars.get("UPSTREAM_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidUpstreamTimeout(format!(
                    "UPSTREAM_TIMEOUT_MS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_UPSTREAM_TIMEOUT_MS {
                return Err(ConfigError::InvalidUpstreamTimeout(format!(
                    "UPSTREAM_TIMEOUT_MS must be between 1 and {}, got {}",
                    MAX_UPSTREAM_TIMEOUT_MS, value
                )));
            }

            value
        } else {
            DEFAULT_UPSTREAM_TIMEOUT_MS
        };

        let route_cache_capacity = if let Some(value_str) = vars.get("ROUTE_CACHE_CAPACITY") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "ROUTE_CACHE_CAPACITY must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCache(
                    "ROUTE_CACHE_CAPACITY must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_ROUTE_CACHE_CAPACITY
        };

        let alt_header = non_empty(vars, "AUTH_ALT_HEADER")
            .unwrap_or_else(|| DEFAULT_ALT_HEADER.to_string())
            .to_ascii_lowercase();
        let cookie_name =
            non_empty(vars, "AUTH_COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
        let query_param =
            non_empty(vars, "AUTH_QUERY_PARAM").unwrap_or_else(|| DEFAULT_QUERY_PARAM.to_string());
        let public_tag =
            non_empty(vars, "PUBLIC_TAG").unwrap_or_else(|| DEFAULT_PUBLIC_TAG.to_string());
        let role_tag_category = non_empty(vars, "ROLE_TAG_CATEGORY")
            .unwrap_or_else(|| DEFAULT_ROLE_TAG_CATEGORY.to_string());
        let role_tag_url = non_empty(vars, "ROLE_TAG_URL");
        if let Some(url) = &role_tag_url {
            validate_http_url("ROLE_TAG_URL", url)?;
        }

        Ok(Config {
            enabled,
            bind_address,
            idp_url,
            idp_anon_key,
            idp_service_key,
            jwks_url,
            jwt_audience,
            jwks_cache_ttl_seconds,
            jwks_auto_refresh,
            role_cache_ttl_seconds,
            jwt_clock_skew_seconds,
            upstream_timeout_ms,
            route_cache_capacity,
            alt_header,
            cookie_name,
            query_param,
            public_tag,
            role_tag_category,
            role_tag_url,
        })
    }

    /// Key-set TTL as a `Duration`.
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    /// Subject-role TTL as a `Duration`.
    pub fn role_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.role_cache_ttl_seconds)
    }

    /// Per-call upstream timeout as a `Duration`.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Clock skew as a `Duration`. Validated positive at load time.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds.unsigned_abs())
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidBool(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{} is not a valid URL: {}", key, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            key, other
        ))),
    }
}
