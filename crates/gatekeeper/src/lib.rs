//! Gatekeeper Library
//!
//! Request-time authentication and authorization for HTTP services that
//! trust an external identity provider:
//!
//! - Signing key caching (JWKS, TTL-based refresh)
//! - Bearer token verification (signature, expiry, audience, subject)
//! - Declared route directory with tag-based access metadata
//! - Tag and subject role resolution with bounded caches
//! - One access decision per request, enforced as axum middleware
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/access.rs -> access/mod.rs
//!                                            ├── directory/
//!                                            ├── auth/ (jwks, jwt)
//!                                            └── roles/
//! ```
//!
//! # Modules
//!
//! - `access` - Per-request decision pipeline and token extraction
//! - `auth` - Key set cache, token verifier, caller context
//! - `config` - Service configuration from environment
//! - `directory` - Route templates and lookup
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers for the demo service
//! - `middleware` - Access enforcement middleware
//! - `models` - Response models
//! - `observability` - Prometheus metrics
//! - `roles` - Role resolution and role sources
//! - `routes` - Axum router setup and route declarations

pub mod access;
pub mod auth;
pub mod config;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod roles;
pub mod routes;
