//! `relaygate init`: generate a starter configuration file.
//!
//! Creates a YAML, JSON, or TOML config file with either minimal
//! or fully documented templates.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::RelayError;

pub fn execute(args: &InitArgs) -> Result<(), RelayError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("relaygate.{}", args.format.extension())));

    if output.exists() {
        return Err(RelayError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

/// JSON has no comments, so its full template is the minimal one.
#[must_use]
pub const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, _) => JSON_MINIMAL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# relaygate config

endpoints:
  - id: "local"
    url: "http://localhost:8080"

tokens:
  - endpoint: "local"
    user: "dev"
    access_token: "replace-me"

sessions:
  - token: "dev-session"
    user: "dev"
"#;

const YAML_FULL: &str = r#"# relaygate config
#
# Values marked "default" may be omitted.

server:
  proxy_prefix: "/proxy"          # default; requests under it are fanned out
  session_cookie: "relay-session" # default; cookie holding the session token

defaults:
  # timeout: 10000                # per-target deadline in ms; unset waits forever
  strip_hop_by_hop: true          # default; drop Connection, TE, etc.

endpoints:
  # Base API address of each backend. The x-relay-api-host header can
  # replace the leading "api." label of the host per request.
  - id: "cf-prod"
    name: "Production"
    url: "https://api.cf.example.com"
    auth_type: "oauth"            # basic | oauth (default) | oidc

  - id: "cf-lab"
    url: "https://api.lab.example.com"
    auth_type: "basic"

tokens:
  # One credential per (endpoint, user). auth_type picks the signing scheme.
  - endpoint: "cf-prod"
    user: "alice"
    auth_type: "oauth"
    access_token: "replace-me"

  - endpoint: "cf-lab"
    user: "alice"
    auth_type: "basic"
    username: "alice"
    password: "replace-me"

  # OIDC tokens may carry their own token type (default "Bearer").
  # - endpoint: "cf-prod"
  #   user: "bob"
  #   auth_type: "oidc"
  #   access_token: "replace-me"
  #   token_type: "Bearer"

sessions:
  # Value of the session cookie -> user it authenticates.
  - token: "alice-session"
    user: "alice"
"#;

const JSON_MINIMAL: &str = r#"{
  "endpoints": [
    { "id": "local", "url": "http://localhost:8080" }
  ],
  "tokens": [
    { "endpoint": "local", "user": "dev", "access_token": "replace-me" }
  ],
  "sessions": [
    { "token": "dev-session", "user": "dev" }
  ]
}
"#;

const TOML_MINIMAL: &str = r#"# relaygate config

[[endpoints]]
id = "local"
url = "http://localhost:8080"

[[tokens]]
endpoint = "local"
user = "dev"
access_token = "replace-me"

[[sessions]]
token = "dev-session"
user = "dev"
"#;

const TOML_FULL: &str = r#"# relaygate config
#
# Values marked "default" may be omitted.

[server]
proxy_prefix = "/proxy"          # default
session_cookie = "relay-session" # default

[defaults]
# timeout = 10000                # per-target deadline in ms; unset waits forever
strip_hop_by_hop = true          # default

[[endpoints]]
id = "cf-prod"
name = "Production"
url = "https://api.cf.example.com"
auth_type = "oauth"              # basic | oauth (default) | oidc

[[endpoints]]
id = "cf-lab"
url = "https://api.lab.example.com"
auth_type = "basic"

[[tokens]]
endpoint = "cf-prod"
user = "alice"
auth_type = "oauth"
access_token = "replace-me"

[[tokens]]
endpoint = "cf-lab"
user = "alice"
auth_type = "basic"
username = "alice"
password = "replace-me"

[[sessions]]
token = "alice-session"
user = "alice"
"#;
