//! Gatekeeper error types.
//!
//! Two layers:
//!
//! - [`AuthError`] is the internal taxonomy of authentication and
//!   authorization failures. It is logged, recorded in metrics, and carried
//!   inside [`crate::access::Decision`], but never rendered to clients.
//! - [`GkError`] is what leaves the service. It maps to an HTTP status via the
//!   `IntoResponse` impl with deliberately generic messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a request failed authentication or authorization.
///
/// Display strings are short, stable identifiers suitable for logs and
/// metric labels. None of them are shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,

    #[error("unknown key id")]
    UnknownKeyId,

    #[error("key set fetch failed")]
    KeyFetchFailure,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    TokenNotYetValid,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("missing subject")]
    MissingSubject,

    #[error("missing token")]
    MissingToken,

    #[error("route not found")]
    RouteNotFound,

    #[error("insufficient role")]
    InsufficientRole,

    #[error("upstream unavailable")]
    UpstreamUnavailable,
}

impl AuthError {
    /// Bounded label value for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownKeyId => "unknown_key_id",
            AuthError::KeyFetchFailure => "key_fetch_failure",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::MissingSubject => "missing_subject",
            AuthError::MissingToken => "missing_token",
            AuthError::RouteNotFound => "route_not_found",
            AuthError::InsufficientRole => "insufficient_role",
            AuthError::UpstreamUnavailable => "upstream_unavailable",
        }
    }
}

/// HTTP-facing error type.
///
/// Maps to:
/// - NotFound: 404 Not Found
/// - Unauthenticated: 401 Unauthorized (with `WWW-Authenticate`)
/// - Forbidden: 403 Forbidden
/// - Internal: 500 Internal Server Error
///
/// The `AuthError` payloads are logged server-side only.
#[derive(Debug, Error)]
pub enum GkError {
    #[error("Not found")]
    NotFound,

    #[error("Not authenticated: {0}")]
    Unauthenticated(AuthError),

    #[error("Forbidden: {0}")]
    Forbidden(AuthError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl GkError {
    /// HTTP status returned to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GkError::NotFound => StatusCode::NOT_FOUND,
            GkError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GkError::Forbidden(_) => StatusCode::FORBIDDEN,
            GkError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: &'static str,
}

impl IntoResponse for GkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            GkError::NotFound => "Not Found",
            GkError::Unauthenticated(_) => "Not authenticated",
            GkError::Forbidden(_) => "Forbidden: insufficient role",
            GkError::Internal(detail) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "gk.errors", error = %detail, "Internal error");
                "Internal server error"
            }
        };

        let body = ErrorResponse {
            status: "error",
            message,
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"gatekeeper\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_auth_error_display_is_terse() {
        assert_eq!(AuthError::UnknownKeyId.to_string(), "unknown key id");
        assert_eq!(AuthError::TokenExpired.to_string(), "token expired");
        assert_eq!(AuthError::InsufficientRole.to_string(), "insufficient role");
    }

    #[test]
    fn test_auth_error_labels_are_snake_case() {
        let all = [
            AuthError::MalformedToken,
            AuthError::UnknownKeyId,
            AuthError::KeyFetchFailure,
            AuthError::SignatureInvalid,
            AuthError::TokenExpired,
            AuthError::TokenNotYetValid,
            AuthError::AudienceMismatch,
            AuthError::MissingSubject,
            AuthError::MissingToken,
            AuthError::RouteNotFound,
            AuthError::InsufficientRole,
            AuthError::UpstreamUnavailable,
        ];
        for err in all {
            let label = err.as_label();
            assert!(
                label.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "label {label} should be snake_case"
            );
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GkError::NotFound.status_code().as_u16(), 404);
        assert_eq!(
            GkError::Unauthenticated(AuthError::TokenExpired)
                .status_code()
                .as_u16(),
            401
        );
        assert_eq!(
            GkError::Forbidden(AuthError::InsufficientRole)
                .status_code()
                .as_u16(),
            403
        );

        let internal = GkError::Internal("boom".to_string());
        let status = internal.status_code();
        assert_eq!(internal.into_response().status(), status);
        assert_eq!(status.as_u16(), 500);
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = GkError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["status"], "error");
        assert_eq!(body_json["message"], "Not Found");
    }

    #[tokio::test]
    async fn test_into_response_unauthenticated_hides_reason() {
        let response = GkError::Unauthenticated(AuthError::AudienceMismatch).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response
            .headers()
            .get("WWW-Authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.starts_with("Bearer"));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["status"], "error");
        assert_eq!(body_json["message"], "Not authenticated");
        assert!(!body_json.to_string().contains("audience"));
    }

    #[tokio::test]
    async fn test_into_response_forbidden() {
        let response = GkError::Forbidden(AuthError::InsufficientRole).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], "Forbidden: insufficient role");
    }

    #[tokio::test]
    async fn test_into_response_internal_is_generic() {
        let response = GkError::Internal("lock poisoned in directory".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], "Internal server error");
        assert!(!body_json.to_string().contains("poisoned"));
    }
}
