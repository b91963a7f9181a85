//! Token verification against the identity provider's published keys.
//!
//! - `jwks` - signing key set cache and key sources
//! - `jwt` - bearer token verification
//! - `context` - authenticated identity handed to downstream handlers

pub mod context;
pub mod jwks;
pub mod jwt;

pub use context::AuthContext;
pub use jwks::{HttpKeySource, KeySetCache, KeySetStats, KeySource, SigningKey};
pub use jwt::{TokenVerifier, VerifiedToken};
