//! Bearer token extraction from an inbound request.
//!
//! Sources are tried in a fixed order, and the first well-formed candidate
//! wins:
//!
//! 1. `Authorization: Bearer <token>`
//! 2. An alternate header, carrying a bare token or `Bearer <token>`
//! 3. A named cookie
//! 4. A named query parameter
//!
//! A candidate that is present but not shaped like a JWT is skipped, and the
//! next source is tried.

use axum::http::{header, HeaderMap};
use common::jwt::is_well_formed;

/// Where a token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    AuthorizationHeader,
    AltHeader,
    Cookie,
    QueryParam,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::AuthorizationHeader => "authorization_header",
            TokenSource::AltHeader => "alt_header",
            TokenSource::Cookie => "cookie",
            TokenSource::QueryParam => "query_param",
        }
    }
}

/// Names of the fallback token locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSources {
    /// Alternate header name, lowercase.
    pub alt_header: String,
    pub cookie_name: String,
    pub query_param: String,
}

impl Default for TokenSources {
    fn default() -> Self {
        Self {
            alt_header: crate::config::DEFAULT_ALT_HEADER.to_string(),
            cookie_name: crate::config::DEFAULT_COOKIE_NAME.to_string(),
            query_param: crate::config::DEFAULT_QUERY_PARAM.to_string(),
        }
    }
}

/// A token candidate that passed the structural check.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtractedToken {
    pub token: String,
    pub source: TokenSource,
}

impl std::fmt::Debug for ExtractedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedToken")
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Find the first well-formed token in `headers` or `query`.
pub fn extract_token(
    headers: &HeaderMap,
    query: Option<&str>,
    sources: &TokenSources,
) -> Option<ExtractedToken> {
    let candidates = [
        (TokenSource::AuthorizationHeader, from_authorization(headers)),
        (TokenSource::AltHeader, from_alt_header(headers, &sources.alt_header)),
        (TokenSource::Cookie, from_cookie(headers, &sources.cookie_name)),
        (TokenSource::QueryParam, query.and_then(|q| from_query(q, &sources.query_param))),
    ];

    for (source, candidate) in candidates {
        let Some(token) = candidate else {
            continue;
        };
        if is_well_formed(&token) {
            return Some(ExtractedToken { token, source });
        }
        tracing::debug!(target: "gk.access", source = source.as_str(), "Ignoring malformed token candidate");
    }

    None
}

/// Strip a case-insensitive `Bearer ` scheme prefix.
fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

fn from_authorization(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    strip_bearer(value).map(ToString::to_string)
}

fn from_alt_header(headers: &HeaderMap, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let value = headers.get(name)?.to_str().ok()?.trim();
    let token = strip_bearer(value).unwrap_or(value);
    (!token.is_empty()).then(|| token.to_string())
}

fn from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(cookie, _)| cookie.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn from_query(query: &str, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
