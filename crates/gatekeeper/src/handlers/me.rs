//! Current user handler.
//!
//! Returns the caller's identity as established by the access middleware.

use crate::auth::AuthContext;
use crate::errors::{AuthError, GkError};
use crate::models::MeResponse;
use axum::{Extension, Json};
use serde_json::Value;
use tracing::instrument;

/// Handler for GET /v1/me
///
/// ## Response
///
/// ```json
/// {
///   "sub": "8f14e45f-ceea-467f-a8f1-2c8d1a2b9f00",
///   "email": "alice@example.com",
///   "roles": ["user"],
///   "exp": 1234567890
/// }
/// ```
///
/// Returns 401 if no identity is attached (auth disabled).
#[instrument(skip_all, name = "gk.handlers.me")]
pub async fn get_me(ctx: Option<Extension<AuthContext>>) -> Result<Json<MeResponse>, GkError> {
    let Some(Extension(ctx)) = ctx else {
        return Err(GkError::Unauthenticated(AuthError::MissingToken));
    };

    tracing::debug!(target: "gk.handlers.me", "Returning caller identity");

    let exp = ctx.claim("exp").and_then(Value::as_i64);
    Ok(Json(MeResponse {
        sub: ctx.subject_id,
        email: ctx.email,
        roles: ctx.roles,
        exp,
    }))
}
