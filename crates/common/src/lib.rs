//! Common utilities and types shared across Gatekeeper components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for bearer token structure helpers (size limits, header decoding, iat checks)
pub mod jwt;
