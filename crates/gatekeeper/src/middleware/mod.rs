//! Middleware for Gatekeeper.
//!
//! # Components
//!
//! - `access` - Route access enforcement for every request

pub mod access;

pub use access::{enforce_access, AccessState, AuthContextExt};
