//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for identity-provider API keys and
//! bearer tokens. `SecretString` implements `Debug` with redaction, so a
//! struct deriving `Debug` that holds one is safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IdpCredentials {
//!     base_url: String,
//!     service_key: SecretString,
//! }
//!
//! let creds = IdpCredentials {
//!     base_url: "https://idp.example.com".to_string(),
//!     service_key: SecretString::from("service-role-key"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("service-role-key"));
//! assert_eq!(creds.service_key.expose_secret(), "service-role-key");
//! ```
//!
//! Use `SecretString` for:
//! - Identity-provider anon and service keys
//! - Bearer tokens carried in request context

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
