//! Endpoint and token lookup.
//!
//! The fan-out core only reads through the [`EndpointDirectory`] and
//! [`TokenStore`] traits. [`StaticDirectory`] is the config-backed
//! implementation: it is built once per loaded config, never mutated,
//! and shared between concurrent executors behind an `Arc`.

use std::collections::HashMap;

use url::Url;

use crate::config::model::{AuthType, Config};
use crate::error::RelayError;

/// A registered backend endpoint, resolved by identifier.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub id: String,
    pub name: Option<String>,
    pub api_endpoint: Url,
    pub auth_type: AuthType,
}

/// Credentials a user holds for one endpoint.
#[derive(Clone)]
pub struct TokenRecord {
    pub auth_type: AuthType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub trait EndpointDirectory: Send + Sync {
    fn endpoint(&self, id: &str) -> Result<EndpointRecord, RelayError>;
}

pub trait TokenStore: Send + Sync {
    fn token(&self, endpoint_id: &str, user_id: &str) -> Result<TokenRecord, RelayError>;
}

#[derive(Debug, Default)]
pub struct StaticDirectory {
    endpoints: HashMap<String, EndpointRecord>,
    tokens: HashMap<(String, String), TokenRecord>,
    sessions: HashMap<String, String>,
}

impl StaticDirectory {
    /// Build the lookup tables from a validated config. Endpoints whose
    /// base address fails to parse are skipped with a warning.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut endpoints = HashMap::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            match Url::parse(&endpoint.url) {
                Ok(api_endpoint) => {
                    endpoints.insert(
                        endpoint.id.clone(),
                        EndpointRecord {
                            id: endpoint.id.clone(),
                            name: endpoint.name.clone(),
                            api_endpoint,
                            auth_type: endpoint.auth_type,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.id, error = %e, "skipping endpoint with invalid url");
                }
            }
        }

        let tokens = config
            .tokens
            .iter()
            .map(|t| {
                (
                    (t.endpoint.clone(), t.user.clone()),
                    TokenRecord {
                        auth_type: config.effective_auth_type(t),
                        username: t.username.clone(),
                        password: t.password.clone(),
                        access_token: t.access_token.clone(),
                        token_type: t.token_type.clone(),
                    },
                )
            })
            .collect();

        let sessions = config
            .sessions
            .iter()
            .map(|s| (s.token.clone(), s.user.clone()))
            .collect();

        Self {
            endpoints,
            tokens,
            sessions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Resolve a session token to the user it belongs to.
    #[must_use]
    pub fn session_user(&self, session_token: &str) -> Option<&str> {
        self.sessions.get(session_token).map(String::as_str)
    }
}

impl EndpointDirectory for StaticDirectory {
    fn endpoint(&self, id: &str) -> Result<EndpointRecord, RelayError> {
        self.endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::EndpointNotFound { id: id.to_string() })
    }
}

impl TokenStore for StaticDirectory {
    fn token(&self, endpoint_id: &str, user_id: &str) -> Result<TokenRecord, RelayError> {
        self.tokens
            .get(&(endpoint_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| RelayError::TokenNotFound {
                endpoint: endpoint_id.to_string(),
                user: user_id.to_string(),
            })
    }
}
