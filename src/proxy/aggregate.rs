//! Turning collected target outcomes into the caller's response.
//!
//! In passthrough mode the single backend's status and body go back
//! untouched. Otherwise every requested key gets an entry in one JSON
//! object: the raw backend body, `null` for an empty body, or an
//! `{"error": ...}` object. Entries are built as raw JSON fragments, and
//! a backend body that is not valid JSON fails the whole encoding rather
//! than producing a partial document.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use serde_json::value::RawValue;

use super::dispatch::{Dispatch, ResultMap};
use super::envelope::ProxyResponse;
use crate::error::RelayError;

pub type JsonResponse = BTreeMap<String, Option<Box<RawValue>>>;

const TIMED_OUT: &str = "Request timed out";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorSummary<'a> {
    status_code: u16,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ErrorEntry<'a> {
    error: ErrorSummary<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackendErrorEntry<'a> {
    error: ErrorSummary<'a>,
    error_response: Option<Box<RawValue>>,
}

/// Error bodies are embedded as JSON when they parse, as a JSON string
/// otherwise, so an HTML error page cannot break the envelope.
fn embed_error_body(body: &[u8]) -> Result<Option<Box<RawValue>>, serde_json::Error> {
    if body.is_empty() {
        return Ok(None);
    }
    if let Ok(text) = std::str::from_utf8(body) {
        if let Ok(raw) = RawValue::from_string(text.to_string()) {
            return Ok(Some(raw));
        }
    }
    serde_json::value::to_raw_value(&String::from_utf8_lossy(body)).map(Some)
}

fn raw_body(body: &[u8]) -> Result<Option<Box<RawValue>>, serde_json::Error> {
    if body.is_empty() {
        return Ok(None);
    }
    let text =
        std::str::from_utf8(body).map_err(<serde_json::Error as serde::de::Error>::custom)?;
    RawValue::from_string(text.to_string()).map(Some)
}

fn build_entry(response: Option<&ProxyResponse>) -> Result<Option<Box<RawValue>>, serde_json::Error> {
    let Some(response) = response else {
        let entry = ErrorEntry {
            error: ErrorSummary {
                status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                status: TIMED_OUT,
                endpoint: None,
                method: None,
                url: None,
            },
        };
        return serde_json::value::to_raw_value(&entry).map(Some);
    };

    if let Some(ref err) = response.error {
        let entry = ErrorEntry {
            error: ErrorSummary {
                status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                status: err,
                endpoint: Some(&response.request.endpoint_id),
                method: None,
                url: None,
            },
        };
        return serde_json::value::to_raw_value(&entry).map(Some);
    }

    match response.status {
        Some(status) if status.as_u16() >= 400 => {
            let url = response.request.url.as_str();
            let entry = BackendErrorEntry {
                error: ErrorSummary {
                    status_code: status.as_u16(),
                    status: status.canonical_reason().unwrap_or("Failed to proxy request"),
                    endpoint: Some(&response.request.endpoint_id),
                    method: Some(response.request.method.as_str()),
                    url: Some(url),
                },
                error_response: embed_error_body(&response.body)?,
            };
            serde_json::value::to_raw_value(&entry).map(Some)
        }
        _ => raw_body(&response.body),
    }
}

/// Build the key -> entry mapping for every requested key.
pub fn build_json_response(keys: &[String], results: &ResultMap) -> Result<JsonResponse, RelayError> {
    let mut out = BTreeMap::new();
    for key in keys {
        if out.contains_key(key) {
            continue;
        }
        let response = results.get(key);
        let entry = build_entry(response).map_err(|e| {
            tracing::error!(
                key = %key,
                error = %e,
                payload = %response.map_or_else(String::new, |r| String::from_utf8_lossy(&r.body).into_owned()),
                "failed to encode target response"
            );
            RelayError::Encode(e)
        })?;
        out.insert(key.clone(), entry);
    }
    Ok(out)
}

/// Render a completed dispatch as the HTTP response sent to the caller.
pub fn send_proxied_response(dispatch: Dispatch) -> Result<Response, RelayError> {
    if dispatch.passthrough {
        let Some(result) = dispatch
            .keys
            .first()
            .and_then(|key| dispatch.results.get(key))
        else {
            return Err(RelayError::PassthroughTimeout);
        };
        let status = result.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Bytes = if result.status.is_none() {
            // Never reached the backend: surface the failure text.
            result.error.clone().unwrap_or_default().into()
        } else {
            result.body.clone()
        };
        return Ok((status, Body::from(body)).into_response());
    }

    let json = build_json_response(&dispatch.keys, &dispatch.results)?;
    let encoded = serde_json::to_vec(&json).map_err(|e| {
        tracing::error!(error = %e, payload = ?json, "failed to encode aggregated response");
        RelayError::Encode(e)
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from(encoded),
    )
        .into_response())
}
