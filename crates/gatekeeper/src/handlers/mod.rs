//! HTTP request handlers for Gatekeeper's demo service.

pub mod admin;
pub mod health;
pub mod me;
pub mod metrics;
pub mod users;

pub use admin::{dashboard, refresh_keys, reload_routes};
pub use health::health_check;
pub use me::get_me;
pub use metrics::metrics_handler;
pub use users::get_user;

use crate::errors::GkError;

/// Fallback for paths with no handler.
pub async fn not_found() -> GkError {
    GkError::NotFound
}
