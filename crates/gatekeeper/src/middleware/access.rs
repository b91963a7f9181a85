//! Access control middleware.
//!
//! Runs every request through [`AccessControl::decide`] and either rejects it
//! with a generic error response or forwards it with the [`AuthContext`] in
//! the request extensions.

use crate::access::{AccessControl, Decision};
use crate::auth::AuthContext;
use crate::errors::GkError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the access middleware.
#[derive(Clone)]
pub struct AccessState {
    pub access: Arc<AccessControl>,

    /// When false, requests pass through without a decision.
    pub enabled: bool,
}

/// Middleware that enforces route access rules.
///
/// # Token Sources
///
/// ```text
/// Authorization: Bearer <token>
/// x-access-token: <token>
/// Cookie: access_token=<token>
/// ?access_token=<token>
/// ```
///
/// (header, cookie and parameter names are configurable)
///
/// # Response
///
/// - 404 Not Found if no declared route matches
/// - 401 Unauthorized with WWW-Authenticate header if the token is missing or invalid
/// - 403 Forbidden if the subject lacks every allowed role
/// - Continues to next handler otherwise, with `AuthContext` in extensions
///   for non-public routes
#[instrument(skip(state, req, next), name = "gk.middleware.access")]
pub async fn enforce_access(
    State(state): State<AccessState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GkError> {
    if !state.enabled {
        return Ok(next.run(req).await);
    }

    let decision = state
        .access
        .decide(
            req.method().as_str(),
            req.uri().path(),
            req.headers(),
            req.uri().query(),
        )
        .await;

    match decision {
        Decision::Allow(Some(ctx)) => {
            req.extensions_mut().insert(ctx);
        }
        Decision::Allow(None) => {}
        Decision::NotFound => return Err(GkError::NotFound),
        Decision::Unauthenticated(reason) => return Err(GkError::Unauthenticated(reason)),
        Decision::Forbidden(reason) => return Err(GkError::Forbidden(reason)),
    }

    Ok(next.run(req).await)
}

/// Extension trait for reading the caller's identity from a request.
pub trait AuthContextExt {
    /// Get the authenticated context from request extensions.
    ///
    /// Returns `None` on public routes, or if the middleware was not applied.
    fn auth_context(&self) -> Option<&AuthContext>;
}

impl<B> AuthContextExt for axum::extract::Request<B> {
    fn auth_context(&self) -> Option<&AuthContext> {
        self.extensions().get::<AuthContext>()
    }
}
