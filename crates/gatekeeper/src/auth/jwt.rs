//! Bearer token verification.
//!
//! Verifies identity-provider access tokens against keys from the
//! [`KeySetCache`].
//!
//! # Security
//!
//! - Tokens are size-checked and structurally parsed before any key lookup
//! - The verification algorithm comes from the key, never from the token
//! - Expiration is required; `nbf` and `iat` are checked with clock skew tolerance
//! - Failure kinds are logged here and returned as [`AuthError`]; callers
//!   decide what (if anything) to show the client

use crate::auth::jwks::KeySetCache;
use crate::errors::AuthError;
use common::jwt::{decode_header, validate_iat};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// A token that passed every verification step.
#[derive(Clone)]
pub struct VerifiedToken {
    /// The `sub` claim.
    pub subject_id: String,

    /// Every claim in the payload, as sent.
    pub claims: Map<String, Value>,
}

impl VerifiedToken {
    /// The `email` claim, if present and a string.
    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(Value::as_str)
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("subject_id", &"[REDACTED]")
            .field("claims", &format_args!("{} claims", self.claims.len()))
            .finish()
    }
}

/// Verifies bearer tokens against the identity provider's key set.
pub struct TokenVerifier {
    key_set: Arc<KeySetCache>,

    /// Expected `aud`; not checked when `None`.
    audience: Option<String>,

    /// Leeway for `exp`/`nbf` and the upper bound on future `iat`.
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a new verifier.
    ///
    /// # Arguments
    ///
    /// * `key_set` - Cache of the identity provider's signing keys
    /// * `audience` - Expected audience, if any
    /// * `clock_skew` - Clock skew tolerance
    pub fn new(key_set: Arc<KeySetCache>, audience: Option<String>, clock_skew: Duration) -> Self {
        Self {
            key_set,
            audience,
            clock_skew,
        }
    }

    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.key_set
    }

    /// Verify a token and return its subject and claims.
    ///
    /// Steps, in order, each with its own failure kind:
    ///
    /// 1. Header parse (`MalformedToken`, no network)
    /// 2. Key lookup by `kid` (`UnknownKeyId`, at most one fetch)
    /// 3. Signature with the key's algorithm (`SignatureInvalid`)
    /// 4. `exp`, `nbf`, `iat` and audience (`TokenExpired`, `TokenNotYetValid`,
    ///    `AudienceMismatch`)
    /// 5. Non-empty `sub` (`MissingSubject`)
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing step.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        // Header
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token header rejected");
            AuthError::MalformedToken
        })?;
        let Some(declared_alg) = header.alg else {
            tracing::debug!(target: "gk.auth.jwt", "Token header has no alg");
            return Err(AuthError::MalformedToken);
        };

        // Key
        let key = self.key_set.get_key(&header.kid).await.ok_or_else(|| {
            tracing::debug!(target: "gk.auth.jwt", kid = %header.kid, "No signing key for kid");
            AuthError::UnknownKeyId
        })?;

        // Signature and standard claims
        if Algorithm::from_str(&declared_alg).ok() != Some(key.algorithm) {
            tracing::warn!(
                target: "gk.auth.jwt",
                kid = %key.key_id,
                declared = %declared_alg,
                expected = ?key.algorithm,
                "Token algorithm does not match key"
            );
            return Err(AuthError::SignatureInvalid);
        }

        let decoding_key = key.decoding_key()?;
        let validation = self.validation_for(key.algorithm);

        let token_data =
            decode::<Map<String, Value>>(token, &decoding_key, &validation).map_err(|e| {
                let kind = classify(e.kind());
                tracing::debug!(target: "gk.auth.jwt", error = %e, kind = %kind, "Token verification failed");
                kind
            })?;
        let claims = token_data.claims;

        if let Some(iat) = claims.get("iat") {
            let iat = iat_seconds(iat).ok_or_else(|| {
                tracing::debug!(target: "gk.auth.jwt", "Token iat is not a number");
                AuthError::MalformedToken
            })?;
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token iat validation failed");
                AuthError::TokenNotYetValid
            })?;
        }

        // Subject
        let subject_id = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                tracing::debug!(target: "gk.auth.jwt", "Token has no subject");
                AuthError::MissingSubject
            })?;

        tracing::debug!(target: "gk.auth.jwt", "Token validated successfully");
        Ok(VerifiedToken { subject_id, claims })
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;

        match &self.audience {
            Some(audience) => {
                validation.set_required_spec_claims(&["exp", "aud"]);
                validation.set_audience(&[audience]);
            }
            None => {
                validation.set_required_spec_claims(&["exp"]);
                validation.validate_aud = false;
            }
        }

        validation
    }
}

/// Map a `jsonwebtoken` failure onto the verification taxonomy.
fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "exp" => AuthError::TokenExpired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::Crypto(_) => AuthError::SignatureInvalid,
        _ => AuthError::MalformedToken,
    }
}

/// `iat` as whole seconds. Fractional values round down; out-of-range
/// values saturate.
fn iat_seconds(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|secs| secs.is_finite())
            .map(|secs| secs.floor() as i64)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::{Jwk, KeySource};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::Utc;
    use gk_test_utils::crypto_fixtures::TestKeypair;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedSource {
        keys: Vec<Value>,
        fetches: AtomicU64,
    }

    #[async_trait]
    impl KeySource for FixedSource {
        async fn fetch(&self) -> Result<Vec<Jwk>, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .keys
                .iter()
                .map(|k| serde_json::from_value(k.clone()).unwrap())
                .collect())
        }
    }

    struct Fixture {
        keypair: TestKeypair,
        source: Arc<FixedSource>,
        verifier: TokenVerifier,
    }

    fn fixture(audience: Option<&str>) -> Fixture {
        let keypair = TestKeypair::new(1, "test-key-01");
        let source = Arc::new(FixedSource {
            keys: vec![keypair.jwk_json()],
            fetches: AtomicU64::new(0),
        });
        let key_set = Arc::new(KeySetCache::new(source.clone()));
        let verifier = TokenVerifier::new(
            key_set,
            audience.map(ToString::to_string),
            Duration::from_secs(300),
        );
        Fixture {
            keypair,
            source,
            verifier,
        }
    }

    fn claims(sub: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": sub,
            "email": "alice@example.com",
            "aud": "authenticated",
            "iat": now,
            "exp": now + 3600,
        })
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject_and_claims() {
        let f = fixture(Some("authenticated"));
        let token = f.keypair.sign(&claims("user-123"));

        let verified = f.verifier.verify(&token).await.unwrap();

        assert_eq!(verified.subject_id, "user-123");
        assert_eq!(verified.email(), Some("alice@example.com"));
        assert_eq!(verified.claims.get("aud"), Some(&json!("authenticated")));
    }

    #[tokio::test]
    async fn test_malformed_token_makes_no_fetch() {
        let f = fixture(None);

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.payload.sig"] {
            assert_eq!(
                f.verifier.verify(token).await.unwrap_err(),
                AuthError::MalformedToken,
                "token {token:?}"
            );
        }

        let oversized = format!("{}.e30.sig", "a".repeat(9000));
        assert_eq!(
            f.verifier.verify(&oversized).await.unwrap_err(),
            AuthError::MalformedToken
        );
        assert_eq!(f.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_after_exactly_one_fetch() {
        let f = fixture(None);
        let stranger = TestKeypair::new(2, "rotated-away");
        let token = stranger.sign(&claims("user-123"));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::UnknownKeyId
        );
        assert_eq!(f.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_key_signature_rejected() {
        let f = fixture(None);
        // Same kid, different private key
        let impostor = TestKeypair::new(9, "test-key-01");
        let token = impostor.sign(&claims("user-123"));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::SignatureInvalid
        );
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let f = fixture(None);
        let token = f.keypair.sign(&claims("user-123"));
        let mut parts = token.split('.');
        let header = parts.next().unwrap();
        let _payload = parts.next().unwrap();
        let signature = parts.next().unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(claims("admin-1").to_string());
        let forged = format!("{header}.{forged_payload}.{signature}");

        assert_eq!(
            f.verifier.verify(&forged).await.unwrap_err(),
            AuthError::SignatureInvalid
        );
    }

    #[tokio::test]
    async fn test_algorithm_confusion_rejected() {
        let f = fixture(None);
        let token = f.keypair.sign(&claims("user-123"));
        let signature = token.rsplit('.').next().unwrap();
        let payload = token.split('.').nth(1).unwrap();

        // Header claims HS256 against an EdDSA key
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT","kid":"test-key-01"}"#);
        let confused = format!("{header}.{payload}.{signature}");

        assert_eq!(
            f.verifier.verify(&confused).await.unwrap_err(),
            AuthError::SignatureInvalid
        );
    }

    #[tokio::test]
    async fn test_missing_alg_is_malformed() {
        let f = fixture(None);
        let header = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","kid":"test-key-01"}"#);
        let token = format!("{header}.e30.c2ln");

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::MalformedToken
        );
        assert_eq!(f.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": now - 7200,
            "exp": now - 3600,
        }));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_expiry_within_clock_skew_accepted() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": now - 600,
            "exp": now - 60,
        }));

        assert!(f.verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_exp_rejected() {
        let f = fixture(None);
        let token = f.keypair.sign(&json!({"sub": "user-123"}));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_future_iat_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": now + 3600,
            "exp": now + 7200,
        }));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
    }

    #[tokio::test]
    async fn test_fractional_future_iat_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": now as f64 + 3600.5,
            "exp": now + 7200,
        }));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
    }

    #[tokio::test]
    async fn test_fractional_past_iat_accepted() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": now as f64 - 0.25,
            "exp": now + 3600,
        }));

        assert!(f.verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_numeric_iat_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "iat": "yesterday",
            "exp": now + 3600,
        }));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_future_nbf_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();
        let token = f.keypair.sign(&json!({
            "sub": "user-123",
            "nbf": now + 3600,
            "exp": now + 7200,
        }));

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
    }

    #[tokio::test]
    async fn test_audience_mismatch_rejected() {
        let f = fixture(Some("authenticated"));
        let mut body = claims("user-123");
        body["aud"] = json!("some-other-service");
        let token = f.keypair.sign(&body);

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::AudienceMismatch
        );
    }

    #[tokio::test]
    async fn test_missing_audience_rejected_when_configured() {
        let f = fixture(Some("authenticated"));
        let mut body = claims("user-123");
        body.as_object_mut().unwrap().remove("aud");
        let token = f.keypair.sign(&body);

        assert_eq!(
            f.verifier.verify(&token).await.unwrap_err(),
            AuthError::AudienceMismatch
        );
    }

    #[tokio::test]
    async fn test_audience_ignored_when_not_configured() {
        let f = fixture(None);
        let mut body = claims("user-123");
        body["aud"] = json!("anything");
        let token = f.keypair.sign(&body);

        assert!(f.verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_empty_subject_rejected() {
        let f = fixture(None);
        let now = Utc::now().timestamp();

        let no_sub = f.keypair.sign(&json!({"iat": now, "exp": now + 3600}));
        assert_eq!(
            f.verifier.verify(&no_sub).await.unwrap_err(),
            AuthError::MissingSubject
        );

        let empty_sub = f
            .keypair
            .sign(&json!({"sub": "", "iat": now, "exp": now + 3600}));
        assert_eq!(
            f.verifier.verify(&empty_sub).await.unwrap_err(),
            AuthError::MissingSubject
        );
    }

    #[test]
    fn test_verified_token_debug_redacts_subject() {
        let token = VerifiedToken {
            subject_id: "secret-user-id".to_string(),
            claims: Map::new(),
        };
        let debug_str = format!("{token:?}");
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_classify_maps_claim_failures() {
        assert_eq!(classify(&ErrorKind::ExpiredSignature), AuthError::TokenExpired);
        assert_eq!(
            classify(&ErrorKind::ImmatureSignature),
            AuthError::TokenNotYetValid
        );
        assert_eq!(
            classify(&ErrorKind::InvalidAudience),
            AuthError::AudienceMismatch
        );
        assert_eq!(
            classify(&ErrorKind::InvalidSignature),
            AuthError::SignatureInvalid
        );
        assert_eq!(classify(&ErrorKind::InvalidToken), AuthError::MalformedToken);
    }
}
