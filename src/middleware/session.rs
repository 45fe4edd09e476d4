//! Session cookie resolution.
//!
//! [`require_session`] looks the configured session cookie up in the
//! loaded session table and stores the owning user as a
//! [`SessionUser`] request extension. Requests without a known session
//! are answered with `401` and never reach a proxy handler.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::server::AppState;

/// The authenticated caller, as resolved from the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser(pub String);

/// Extract a cookie value from every `Cookie` header on the request.
#[must_use]
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
        .filter(|v| !v.is_empty())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "message": "User session could not be found" })),
    )
        .into_response()
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = {
        let loaded = state.config.read().await;
        cookie_value(req.headers(), &loaded.config.server.session_cookie)
            .and_then(|token| loaded.directory.session_user(token))
            .map(String::from)
    };

    let Some(user) = user else {
        tracing::debug!(path = %req.uri().path(), "request without a valid session");
        return unauthorized();
    };

    req.extensions_mut().insert(SessionUser(user));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_named_cookie() {
        let mut h = HeaderMap::new();
        h.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; relay-session=abc123; lang=en"),
        );
        assert_eq!(cookie_value(&h, "relay-session"), Some("abc123"));
        assert_eq!(cookie_value(&h, "missing"), None);
    }

    #[test]
    fn searches_every_cookie_header() {
        let mut h = HeaderMap::new();
        h.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        h.append(header::COOKIE, HeaderValue::from_static("relay-session=\"xyz\""));
        assert_eq!(cookie_value(&h, "relay-session"), Some("xyz"));
    }

    #[test]
    fn empty_cookie_is_absent() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("relay-session="));
        assert_eq!(cookie_value(&h, "relay-session"), None);
    }
}
