//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for Gatekeeper.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 keys, JWK/JWKS JSON)
//! - Test data builders (TestTokenBuilder)
//! - Role fixtures (in-memory tag map and role store matching the demo routes)
//! - Server test harness (TestGatekeeperServer for E2E tests)
//! - Fixed test IDs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gk_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let keypair = TestKeypair::new(1, TEST_KEY_ID_1);
//!     let server = TestGatekeeperServer::spawn(&[&keypair]).await?;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_subject(TEST_SUBJECT_ADMIN)
//!         .sign(&keypair);
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/admin/dashboard", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod role_fixtures;
pub mod server_harness;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use role_fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
pub use token_builders::*;
