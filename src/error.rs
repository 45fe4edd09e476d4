//! Unified error types for relaygate.
//!
//! Defines [`RelayError`] (the main crate error enum) and
//! [`ValidationError`] for config validation failures. Proxy-facing
//! variants carry an HTTP status via [`RelayError::status_code`] and
//! render as `{"message": ...}` through [`IntoResponse`].

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}: {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: BoxError,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: BoxError,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("No endpoints specified in the x-relay-endpoints header")]
    EmptyTargetList,

    #[error("Malformed endpoint list: {0}")]
    MalformedTargetList(String),

    #[error("Unknown endpoint: {id}")]
    EndpointNotFound { id: String },

    #[error("No token found for endpoint {endpoint} and user {user}")]
    TokenNotFound { endpoint: String, user: String },

    #[error("Requested passthrough to {count} endpoints. Only single endpoint passthroughs are supported.")]
    MultiTargetPassthrough { count: usize },

    #[error("Duplicate result key in batch: {0}")]
    DuplicateResultKey(String),

    #[error("Invalid batch request: {0}")]
    InvalidBatch(String),

    #[error("Corrupted session")]
    CorruptedSession,

    #[error("Request timed out")]
    PassthroughTimeout,

    #[error("Failed to encode aggregated response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl RelayError {
    /// HTTP status used when this error surfaces on the proxy API.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyTargetList
            | Self::MalformedTargetList(_)
            | Self::EndpointNotFound { .. }
            | Self::MultiTargetPassthrough { .. }
            | Self::DuplicateResultKey(_)
            | Self::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            Self::PassthroughTimeout => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
