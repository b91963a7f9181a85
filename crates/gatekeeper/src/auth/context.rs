//! Authenticated identity attached to an allowed request.
//!
//! Built once per request from a [`VerifiedToken`] and the subject's resolved
//! roles. Lives in the request extensions and is dropped with the request.
//! Identifiers and the raw token are redacted in Debug output.

use crate::auth::jwt::VerifiedToken;
use common::secret::SecretString;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of the caller on an allowed, non-public route.
#[derive(Clone)]
pub struct AuthContext {
    /// The token's `sub` claim - redacted in Debug output.
    pub subject_id: String,

    /// The token's `email` claim, if any - redacted in Debug output.
    pub email: Option<String>,

    /// Every claim from the verified token.
    pub raw_claims: Map<String, Value>,

    /// The bearer token as presented, for calls made on the caller's behalf.
    pub token: SecretString,

    /// Roles the subject held at decision time.
    pub roles: BTreeSet<String>,
}

impl AuthContext {
    pub fn new(verified: VerifiedToken, token: &str, roles: BTreeSet<String>) -> Self {
        let email = verified.email().map(ToString::to_string);
        Self {
            subject_id: verified.subject_id,
            email,
            raw_claims: verified.claims,
            token: SecretString::from(token),
            roles,
        }
    }

    /// Check if the subject holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// A claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.raw_claims.get(name)
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("subject_id", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("claims", &self.raw_claims.keys().collect::<Vec<_>>())
            .field("token", &self.token)
            .field("roles", &self.roles)
            .finish()
    }
}
