//! Per-target request envelopes.
//!
//! A [`ProxyRequest`] is built by the dispatcher for every
//! (caller request, endpoint) pair and moved into exactly one executor
//! task. The executor hands it back inside a [`ProxyResponse`], the only
//! place outcome fields exist, so an outcome is written once and read
//! only after the task has reported.

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use url::Url;

use crate::directory::EndpointDirectory;
use crate::error::RelayError;

/// Leading host label replaced by a caller-supplied host override.
pub const API_PREFIX: &str = "api.";

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub endpoint_id: String,
    pub user_id: String,
    /// Batch callers key results by this instead of the endpoint id.
    pub result_key: Option<String>,
    pub method: Method,
    pub url: Url,
    pub body: Bytes,
    pub headers: HeaderMap,
}

impl ProxyRequest {
    #[must_use]
    pub fn result_key(&self) -> &str {
        self.result_key.as_deref().unwrap_or(&self.endpoint_id)
    }
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub request: ProxyRequest,
    /// `None` when no response was received from the backend.
    pub status: Option<StatusCode>,
    pub body: Bytes,
    pub error: Option<String>,
    pub latency: Duration,
}

impl ProxyResponse {
    #[must_use]
    pub fn failed(request: ProxyRequest, error: String, latency: Duration) -> Self {
        Self {
            request,
            status: None,
            body: Bytes::new(),
            error: Some(error),
            latency,
        }
    }

    /// Transport failures look like a 500 carrying the error text as body.
    #[must_use]
    pub fn transport_error(request: ProxyRequest, error: String, latency: Duration) -> Self {
        Self {
            request,
            status: Some(StatusCode::INTERNAL_SERVER_ERROR),
            body: Bytes::from(error.clone()),
            error: Some(error),
            latency,
        }
    }
}

/// A fully described request for the batch entry point.
#[derive(Debug, Clone)]
pub struct ProxyRequestInfo {
    pub endpoint_id: String,
    pub user_id: String,
    pub result_key: String,
    pub method: Method,
    pub uri: Uri,
    pub body: Bytes,
    pub headers: HeaderMap,
}

/// Append the caller's path and query to an endpoint base address.
#[must_use]
pub fn target_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let base_path = base.path().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    url.set_path(&format!("{base_path}/{path}"));
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

/// Rewrite the target host with a caller-supplied label.
///
/// Labels containing `.` are refused so a caller cannot point the
/// gateway at an arbitrary domain. A leading `api.` is replaced by the
/// label; any other host gets the label prepended. Returns whether the
/// URL was changed.
pub fn apply_host_override(url: &mut Url, label: &str) -> bool {
    if label.is_empty() || label.contains('.') {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let rewritten = host.strip_prefix(API_PREFIX).map_or_else(
        || format!("{label}.{host}"),
        |rest| format!("{label}.{rest}"),
    );
    match url.set_host(Some(&rewritten)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(host = %rewritten, error = %e, "ignoring invalid api host override");
            false
        }
    }
}

/// Resolve the endpoint and build its envelope.
#[allow(clippy::too_many_arguments)]
pub fn build_proxy_request(
    directory: &dyn EndpointDirectory,
    endpoint_id: &str,
    user_id: &str,
    method: &Method,
    uri: &Uri,
    body: &Bytes,
    headers: &HeaderMap,
) -> Result<ProxyRequest, RelayError> {
    let endpoint = directory.endpoint(endpoint_id)?;
    Ok(ProxyRequest {
        endpoint_id: endpoint_id.to_string(),
        user_id: user_id.to_string(),
        result_key: None,
        method: method.clone(),
        url: target_url(&endpoint.api_endpoint, uri.path(), uri.query()),
        body: body.clone(),
        headers: headers.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn joins_base_and_path() {
        let joined = target_url(&url("https://api.example.com"), "/v2/apps", Some("q=name:x"));
        assert_eq!(joined.as_str(), "https://api.example.com/v2/apps?q=name:x");
    }

    #[test]
    fn keeps_base_path() {
        let joined = target_url(&url("https://k8s.example.com/cluster-a/"), "/api/v1/pods", None);
        assert_eq!(joined.as_str(), "https://k8s.example.com/cluster-a/api/v1/pods");
    }

    #[test]
    fn drops_empty_query() {
        let joined = target_url(&url("https://api.example.com"), "/v2/info", Some(""));
        assert_eq!(joined.as_str(), "https://api.example.com/v2/info");
    }

    #[test]
    fn override_replaces_api_prefix() {
        let mut u = url("https://api.example.com/v2/info");
        assert!(apply_host_override(&mut u, "foo"));
        assert_eq!(u.host_str(), Some("foo.example.com"));
        assert_eq!(u.path(), "/v2/info");
    }

    #[test]
    fn override_prepends_label() {
        let mut u = url("https://svc.example.com");
        assert!(apply_host_override(&mut u, "foo"));
        assert_eq!(u.host_str(), Some("foo.svc.example.com"));
    }

    #[test]
    fn dotted_override_is_ignored() {
        let mut u = url("https://api.example.com");
        assert!(!apply_host_override(&mut u, "evil.com"));
        assert_eq!(u.host_str(), Some("api.example.com"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut u = url("https://api.example.com");
        assert!(!apply_host_override(&mut u, ""));
        assert_eq!(u.host_str(), Some("api.example.com"));
    }

    #[test]
    fn override_keeps_port() {
        let mut u = url("http://api.example.com:8443/x");
        assert!(apply_host_override(&mut u, "uaa"));
        assert_eq!(u.as_str(), "http://uaa.example.com:8443/x");
    }

    #[test]
    fn result_key_defaults_to_endpoint() {
        let mut req = ProxyRequest {
            endpoint_id: "cf-1".into(),
            user_id: "alice".into(),
            result_key: None,
            method: Method::GET,
            url: url("https://api.example.com"),
            body: Bytes::new(),
            headers: HeaderMap::new(),
        };
        assert_eq!(req.result_key(), "cf-1");
        req.result_key = Some("apps".into());
        assert_eq!(req.result_key(), "apps");
    }
}
