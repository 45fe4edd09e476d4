//! Control header parsing and outbound header sanitization.
//!
//! Callers steer the gateway with headers in the `x-relay-` namespace:
//! the target list, the passthrough flag, and the api host override.
//! None of those, nor the session cookie, ever reach a backend.
//! [`forward_standard_headers`] copies everything else onto the
//! outbound request, minus hop-by-hop headers and a few that backends
//! are known to reject.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName};

use crate::error::RelayError;

pub const CONTROL_PREFIX: &str = "x-relay-";
pub const TARGET_LIST: &str = "x-relay-endpoints";
pub const PASSTHROUGH: &str = "x-relay-passthrough";
pub const API_HOST: &str = "x-relay-api-host";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Parse the comma separated endpoint list. Order and duplicates are kept.
pub fn parse_target_list(headers: &HeaderMap) -> Result<Vec<String>, RelayError> {
    let raw = match headers.get(TARGET_LIST) {
        None => return Err(RelayError::EmptyTargetList),
        Some(v) => v
            .to_str()
            .map_err(|_| RelayError::MalformedTargetList("header is not valid ASCII".into()))?,
    };

    if raw.trim().is_empty() {
        return Err(RelayError::EmptyTargetList);
    }

    raw.split(',')
        .map(|id| {
            let id = id.trim();
            if id.is_empty() {
                Err(RelayError::MalformedTargetList(format!("empty identifier in '{raw}'")))
            } else {
                Ok(id.to_string())
            }
        })
        .collect()
}

#[must_use]
pub fn is_passthrough(headers: &HeaderMap) -> bool {
    headers
        .get(PASSTHROUGH)
        .is_some_and(|v| v.as_bytes() == b"true")
}

#[must_use]
pub fn api_host_override(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The inbound header set carried by every envelope. The cookie header
/// holds the gateway session and is dropped here.
#[must_use]
pub fn envelope_headers(original: &HeaderMap) -> HeaderMap {
    let mut headers = original.clone();
    headers.remove(header::COOKIE);
    headers
}

fn is_forwardable(name: &HeaderName) -> bool {
    // Referer makes some backends answer 403.
    !(name == header::COOKIE
        || name == header::CONNECTION
        || name == header::REFERER
        || name == header::HOST
        || name == header::CONTENT_LENGTH
        || name.as_str().starts_with(CONTROL_PREFIX))
}

/// Header names the sender nominated as hop-by-hop in its `Connection`
/// value (RFC 9110 section 7.6.1).
fn connection_nominated(source: &HeaderMap) -> Vec<HeaderName> {
    source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// Copy envelope headers onto an outbound request.
pub fn forward_standard_headers(source: &HeaderMap, target: &mut HeaderMap, strip_hop_by_hop: bool) {
    let nominated = if strip_hop_by_hop {
        connection_nominated(source)
    } else {
        Vec::new()
    };
    for (name, value) in source {
        if !is_forwardable(name)
            || (strip_hop_by_hop && (HOP_BY_HOP.contains(name) || nominated.contains(name)))
        {
            continue;
        }
        target.append(name.clone(), value.clone());
    }
}
