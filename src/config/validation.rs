//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as an empty endpoint table, duplicate identifiers, bad
//! base addresses, tokens pointing at unknown endpoints or missing the
//! credentials their auth type needs, and duplicate session tokens.
//! Returns a list of [`ValidationError`] values with per-field suggestions.

use std::collections::HashSet;

use url::Url;

use super::model::{AuthType, Config, Token};
use crate::error::ValidationError;

/// Validate an endpoint base address. Returns `Ok(())` or a human-readable error.
pub fn validate_endpoint_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ));
            }
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(format!("'{url}' has no host"));
            }
            if parsed.query().is_some() {
                return Err("base address must not carry a query string".into());
            }
            Ok(())
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate the proxy mount prefix. Returns `Ok(())` or a human-readable error.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if !prefix.starts_with('/') {
        return Err(format!("prefix must start with '/' (did you mean '/{prefix}'?)"));
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err("prefix must not end with '/'".into());
    }
    if prefix == "/" || prefix == "/health" || prefix == "/batch" {
        return Err(format!("prefix '{prefix}' collides with a built-in route"));
    }
    Ok(())
}

fn credential_problem(token: &Token, auth_type: AuthType) -> Option<&'static str> {
    match auth_type {
        AuthType::Basic => {
            if token.username.as_deref().is_none_or(str::is_empty) {
                Some("basic auth requires a username")
            } else if token.password.is_none() {
                Some("basic auth requires a password")
            } else {
                None
            }
        }
        AuthType::Oauth | AuthType::Oidc => {
            if token.access_token.as_deref().is_none_or(str::is_empty) {
                Some("token auth requires an access_token")
            } else {
                None
            }
        }
    }
}

#[allow(clippy::too_many_lines)]
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(msg) = validate_prefix(&config.server.proxy_prefix) {
        errors.push(ValidationError {
            section: "server".into(),
            field: "proxy_prefix".into(),
            message: msg,
            suggestion: None,
        });
    }

    if config.server.session_cookie.trim().is_empty() {
        errors.push(ValidationError {
            section: "server".into(),
            field: "session_cookie".into(),
            message: "session cookie name cannot be empty".into(),
            suggestion: Some("the default is 'relay-session'".into()),
        });
    }

    if config.defaults.timeout == Some(0) {
        errors.push(ValidationError {
            section: "defaults".into(),
            field: "timeout".into(),
            message: "timeout must be greater than 0".into(),
            suggestion: Some("remove the field to wait without a deadline".into()),
        });
    }

    if config.endpoints.is_empty() {
        errors.push(ValidationError {
            section: "(root)".into(),
            field: "endpoints".into(),
            message: "at least one endpoint must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut endpoint_ids = HashSet::new();

    for (i, endpoint) in config.endpoints.iter().enumerate() {
        let section = format!("endpoints[{i}]");

        if endpoint.id.trim().is_empty() {
            errors.push(ValidationError {
                section: section.clone(),
                field: "id".into(),
                message: "endpoint id cannot be empty".into(),
                suggestion: None,
            });
        } else if endpoint.id.contains(',') {
            errors.push(ValidationError {
                section: section.clone(),
                field: "id".into(),
                message: "endpoint id cannot contain ','".into(),
                suggestion: None,
            });
        } else if !endpoint_ids.insert(endpoint.id.as_str()) {
            errors.push(ValidationError {
                section: section.clone(),
                field: "id".into(),
                message: format!("duplicate endpoint id '{}'", endpoint.id),
                suggestion: None,
            });
        }

        if let Err(msg) = validate_endpoint_url(&endpoint.url) {
            errors.push(ValidationError {
                section,
                field: "url".into(),
                message: msg,
                suggestion: if endpoint.url.contains("://") {
                    None
                } else {
                    Some(format!("did you mean 'https://{}'?", endpoint.url))
                },
            });
        }
    }

    let mut token_keys = HashSet::new();

    for (i, token) in config.tokens.iter().enumerate() {
        let section = format!("tokens[{i}]");

        if !endpoint_ids.contains(token.endpoint.as_str()) {
            errors.push(ValidationError {
                section: section.clone(),
                field: "endpoint".into(),
                message: format!("unknown endpoint '{}'", token.endpoint),
                suggestion: None,
            });
        }

        if token.user.trim().is_empty() {
            errors.push(ValidationError {
                section: section.clone(),
                field: "user".into(),
                message: "user cannot be empty".into(),
                suggestion: None,
            });
        }

        if !token_keys.insert((token.endpoint.as_str(), token.user.as_str())) {
            errors.push(ValidationError {
                section: section.clone(),
                field: "user".into(),
                message: format!(
                    "duplicate token for endpoint '{}' and user '{}'",
                    token.endpoint, token.user
                ),
                suggestion: None,
            });
        }

        if let Some(problem) = credential_problem(token, config.effective_auth_type(token)) {
            errors.push(ValidationError {
                section,
                field: "auth_type".into(),
                message: problem.into(),
                suggestion: None,
            });
        }
    }

    let mut session_tokens = HashSet::new();

    for (i, session) in config.sessions.iter().enumerate() {
        let section = format!("sessions[{i}]");

        if session.token.is_empty() {
            errors.push(ValidationError {
                section: section.clone(),
                field: "token".into(),
                message: "session token cannot be empty".into(),
                suggestion: None,
            });
        } else if !session_tokens.insert(session.token.as_str()) {
            errors.push(ValidationError {
                section: section.clone(),
                field: "token".into(),
                message: "duplicate session token".into(),
                suggestion: None,
            });
        }

        if session.user.trim().is_empty() {
            errors.push(ValidationError {
                section,
                field: "user".into(),
                message: "user cannot be empty".into(),
                suggestion: None,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} endpoints, {} tokens, {} sessions\n",
        config.endpoints.len(),
        config.tokens.len(),
        config.sessions.len()
    )];

    for endpoint in &config.endpoints {
        let users = config
            .tokens
            .iter()
            .filter(|t| t.endpoint == endpoint.id)
            .count();
        lines.push(format!(
            "  {}  -> {} ({})",
            endpoint.id, endpoint.url, endpoint.auth_type
        ));
        if let Some(ref name) = endpoint.name {
            lines.push(format!("    name:   {name}"));
        }
        lines.push(format!("    tokens: {users}"));
    }

    let timeout = config
        .defaults
        .timeout
        .map_or_else(|| "none (wait for every target)".to_string(), |t| format!("{t}ms"));
    lines.push(format!("\n  proxy prefix: {}", config.server.proxy_prefix));
    lines.push(format!("  timeout:      {timeout}"));

    format!("{} is valid\n{}", path, lines.join("\n"))
}
