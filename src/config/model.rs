//! Serde data structures for the relaygate configuration file.
//!
//! Contains [`Config`] (the root), [`ServerSettings`], [`Defaults`],
//! [`Endpoint`], [`Token`], and [`Session`]. All types derive
//! `Serialize` and `Deserialize` with `deny_unknown_fields` for strict
//! parsing.

use serde::{Deserialize, Serialize};

fn default_proxy_prefix() -> String {
    "/proxy".to_string()
}

fn default_session_cookie() -> String {
    "relay-session".to_string()
}

const fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_default_server(v: &ServerSettings) -> bool {
    v.proxy_prefix == default_proxy_prefix() && v.session_cookie == default_session_cookie()
}

fn is_default_defaults(v: &Defaults) -> bool {
    v.timeout.is_none() && v.strip_hop_by_hop
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "is_default_server")]
    pub server: ServerSettings,

    #[serde(default, skip_serializing_if = "is_default_defaults")]
    pub defaults: Defaults,

    pub endpoints: Vec<Endpoint>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<Session>,
}

impl Config {
    /// Scheme a token is signed with: its own `auth_type` when set,
    /// otherwise the one declared on its endpoint.
    #[must_use]
    pub fn effective_auth_type(&self, token: &Token) -> AuthType {
        token.auth_type.unwrap_or_else(|| {
            self.endpoints
                .iter()
                .find(|e| e.id == token.endpoint)
                .map(|e| e.auth_type)
                .unwrap_or_default()
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Path prefix the fan-out surface is mounted under.
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,

    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            proxy_prefix: default_proxy_prefix(),
            session_cookie: default_session_cookie(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Per-target deadline in milliseconds. Unset means the fan-in waits
    /// for every target indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub strip_hop_by_hop: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: None,
            strip_hop_by_hop: default_true(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic,
    #[default]
    Oauth,
    Oidc,
}

impl AuthType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Oauth => "oauth",
            Self::Oidc => "oidc",
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base API address, e.g. `https://api.cf.example.com`.
    pub url: String,

    #[serde(default)]
    pub auth_type: AuthType,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Token {
    pub endpoint: String,
    pub user: String,

    /// Signing scheme; unset means the endpoint's own `auth_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Session {
    pub token: String,
    pub user: String,
}
