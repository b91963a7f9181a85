//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWK form, and token signing.
//! All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// An Ed25519 keypair with a key id, as published by an identity provider.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "test-key-2025-01");
/// let jwks = jwks_json(&[&keypair]);
/// let token = keypair.sign(&json!({"sub": "alice", "exp": 4102444800i64}));
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    kid: String,
    public_key: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Build the keypair for `seed`. The same seed always yields the same key.
    ///
    /// # Panics
    ///
    /// If ring rejects the derived seed, which does not happen for any `u8`.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("deterministic test keypair")
    }

    /// Fallible form of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        // Generate keypair from seed using ring's from_seed_unchecked
        // Note: This is deterministic and suitable for testing
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            kid: kid.to_string(),
            public_key: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The public key as an OKP JWK.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
        })
    }

    /// Sign `claims` with an `EdDSA` header carrying this key's `kid`.
    ///
    /// # Panics
    ///
    /// If `claims` cannot be serialized.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
            .expect("test token signing")
    }

    /// Sign `claims` with an arbitrary header (for example a wrong `kid`).
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> Result<String, FixtureError> {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).map_err(|e| FixtureError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for TestKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestKeypair")
            .field("kid", &self.kid)
            .field("private_key_pkcs8", &"[REDACTED]")
            .finish()
    }
}

/// A `{"keys": [...]}` document for `keypairs`.
pub fn jwks_json(keypairs: &[&TestKeypair]) -> Value {
    json!({
        "keys": keypairs.iter().map(|kp| kp.jwk_json()).collect::<Vec<_>>(),
    })
}

/// Create deterministic 32-byte seed from input
fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    // Fill rest with deterministic pattern
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production keys come from the identity provider.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 format for Ed25519 (RFC 5208):
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier,
    //   privateKey      OCTET STRING
    // }
    // Where privateKey for Ed25519 is:
    // OCTET STRING containing OCTET STRING with 32-byte seed

    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING wrapping OCTET STRING with seed
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
