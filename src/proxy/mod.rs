//! Multi-endpoint request forwarding.
//!
//! [`proxy_handler`] serves everything under the configured proxy prefix:
//! it replays the request against every endpoint named in the
//! `x-relay-endpoints` header and answers with either the single
//! backend's raw response (passthrough) or one JSON object keyed by
//! endpoint. [`batch_handler`] runs a list of explicit request
//! descriptors through the same machinery. Submodules hold the envelope
//! types ([`envelope`]), header rules ([`headers`]), per-target execution
//! ([`executor`]), fan-out/fan-in ([`dispatch`]) and response encoding
//! ([`aggregate`]).

pub mod aggregate;
pub mod dispatch;
pub mod envelope;
pub mod executor;
pub mod headers;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::Instrument;

use crate::error::RelayError;
use crate::middleware::session::SessionUser;
use crate::server::AppState;
use dispatch::{Dispatch, Dispatcher, InboundRequest};
use envelope::ProxyRequestInfo;
use executor::Executor;

/// Wire the dispatcher to the currently loaded directory.
fn dispatcher_for(state: &AppState, loaded: &crate::server::LoadedConfig) -> Dispatcher {
    let defaults = &loaded.config.defaults;
    let executor = Executor::new(loaded.directory.clone(), Arc::clone(&state.auth))
        .with_timeout(defaults.timeout.map(Duration::from_millis))
        .with_strip_hop_by_hop(defaults.strip_hop_by_hop);
    Dispatcher::new(loaded.directory.clone(), executor)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

/// Strip the proxy prefix, keeping the query string.
fn replay_uri(uri: &Uri, prefix: &str) -> Result<Uri, RelayError> {
    let rest = uri.path().strip_prefix(prefix).unwrap_or_default();
    let path = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    };
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    path_and_query.parse().map_err(|e: axum::http::uri::InvalidUri| RelayError::UriParse {
        source: Box::new(e),
    })
}

fn finish(state: &AppState, outcome: Result<Dispatch, RelayError>) -> Response {
    let result = outcome.and_then(|dispatch| {
        let failed_targets = dispatch
            .results
            .values()
            .filter(|r| r.error.is_some())
            .count() as u64;
        state
            .stats
            .target_failures
            .fetch_add(failed_targets, Ordering::Relaxed);
        aggregate::send_proxied_response(dispatch)
    });

    match result {
        Ok(response) => {
            state.stats.dispatched.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!(error = %e, "proxy request failed");
            } else {
                tracing::warn!(error = %e, "proxy request rejected");
            }
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            e.into_response()
        }
    }
}

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<SessionUser>>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&req_headers);
    let span = tracing::info_span!(
        "proxy",
        correlation_id = %correlation_id,
        method = %method,
        path = %uri.path()
    );

    async move {
        // Release the config lock before dispatching
        let dispatcher = {
            let loaded = state.config.read().await;
            dispatcher_for(&state, &loaded)
        };

        let outcome = match replay_uri(&uri, &state.proxy_prefix) {
            Ok(replay) => {
                dispatcher
                    .proxy_request(InboundRequest {
                        user_id: user.as_ref().map(|Extension(u)| u.0.as_str()),
                        method: &method,
                        uri: &replay,
                        headers: &req_headers,
                        body: &body,
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        let mut response = finish(&state, outcome);
        if let Ok(val) = HeaderValue::from_str(&correlation_id) {
            response.headers_mut().insert("x-correlation-id", val);
        }
        response
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub requests: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchItem {
    pub endpoint: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl BatchItem {
    fn into_info(self, user_id: &str) -> Result<ProxyRequestInfo, RelayError> {
        let invalid = RelayError::InvalidBatch;

        let method = match self.method.as_deref() {
            None => Method::GET,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid(format!("'{m}' is not a valid HTTP method")))?,
        };

        if !self.path.starts_with('/') {
            return Err(invalid(format!(
                "path must start with '/' (did you mean '/{}'?)",
                self.path
            )));
        }
        let uri: Uri = self
            .path
            .parse()
            .map_err(|_| invalid(format!("'{}' is not a valid path", self.path)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = name
                .parse::<HeaderName>()
                .map_err(|_| invalid(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("invalid value for header '{name}'")))?;
            headers.append(name, value);
        }

        let body = match self.body {
            None | Some(serde_json::Value::Null) => Bytes::new(),
            Some(value) => Bytes::from(
                serde_json::to_vec(&value).map_err(|e| invalid(e.to_string()))?,
            ),
        };

        Ok(ProxyRequestInfo {
            result_key: self.key.unwrap_or_else(|| self.endpoint.clone()),
            endpoint_id: self.endpoint,
            user_id: user_id.to_string(),
            method,
            uri,
            body,
            headers,
        })
    }
}

pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<SessionUser>>,
    req_headers: HeaderMap,
    batch: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let correlation_id = correlation_id(&req_headers);
    let span = tracing::info_span!("batch", correlation_id = %correlation_id);

    async move {
        let dispatcher = {
            let loaded = state.config.read().await;
            dispatcher_for(&state, &loaded)
        };

        let outcome = match (user, batch) {
            (None, _) => Err(RelayError::CorruptedSession),
            (Some(_), Err(rejection)) => Err(RelayError::InvalidBatch(rejection.body_text())),
            (Some(Extension(SessionUser(user_id))), Ok(Json(batch))) => {
                match batch
                    .requests
                    .into_iter()
                    .map(|item| item.into_info(&user_id))
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(infos) => dispatcher.proxy_batch(infos).await,
                    Err(e) => Err(e),
                }
            }
        };

        let mut response = finish(&state, outcome);
        if let Ok(val) = HeaderValue::from_str(&correlation_id) {
            response.headers_mut().insert("x-correlation-id", val);
        }
        response
    }
    .instrument(span)
    .await
}
