//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating identity-provider style token claims.

use crate::crypto_fixtures::TestKeypair;
use crate::test_ids::TEST_AUDIENCE;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_subject("alice")
///     .with_email("alice@example.com")
///     .expires_in(3600)
///     .sign(&keypair);
/// ```
pub struct TestTokenBuilder {
    sub: Option<String>,
    email: Option<String>,
    aud: Option<String>,
    exp: Option<i64>,
    iat: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults: subject `test-subject`,
    /// audience `authenticated`, issued now, expiring in one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: Some("test-subject".to_string()),
            email: None,
            aud: Some(TEST_AUDIENCE.to_string()),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            iat: now.timestamp(),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Omit the `sub` claim
    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(audience.to_string());
        self
    }

    /// Omit the `aud` claim
    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Omit the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), json!(aud));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }

    /// Build and sign with `keypair`
    pub fn sign(self, keypair: &TestKeypair) -> String {
        keypair.sign(&self.build())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new()
            .for_subject("alice")
            .with_email("alice@example.com")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["email"], "alice@example.com");
        assert_eq!(claims["aud"], TEST_AUDIENCE);
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
        assert!(claims.get("nbf").is_none());
    }

    #[test]
    fn test_builder_default() {
        let claims = TestTokenBuilder::default().build();
        assert_eq!(claims["sub"], "test-subject");
    }

    #[test]
    fn test_omitted_claims() {
        let claims = TestTokenBuilder::new()
            .without_subject()
            .without_audience()
            .without_expiry()
            .build();

        assert!(claims.get("sub").is_none());
        assert!(claims.get("aud").is_none());
        assert!(claims.get("exp").is_none());
        assert!(claims.get("iat").is_some());
    }

    #[test]
    fn test_extra_claims_do_not_override_builder_fields() {
        let claims = TestTokenBuilder::new()
            .for_subject("alice")
            .with_claim("sub", json!("mallory"))
            .with_claim("role", json!("authenticated"))
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["role"], "authenticated");
    }
}
