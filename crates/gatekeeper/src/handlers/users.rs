//! User lookup handler.

use crate::auth::AuthContext;
use crate::models::UserResponse;
use axum::extract::Path;
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /users/{id}
#[instrument(skip_all, name = "gk.handlers.users")]
pub async fn get_user(
    Path(id): Path<String>,
    ctx: Option<Extension<AuthContext>>,
) -> Json<UserResponse> {
    let is_self = ctx.is_some_and(|Extension(ctx)| ctx.subject_id == id);
    Json(UserResponse { id, is_self })
}
