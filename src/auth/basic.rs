//! HTTP Basic signing.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::{HeaderValue, AUTHORIZATION};

use super::{send, AuthStrategy, OutboundRequest, UpstreamResponse};
use crate::directory::TokenRecord;
use crate::error::BoxError;
use crate::proxy::envelope::ProxyRequest;
use crate::server::HttpClient;

pub struct BasicAuth {
    client: HttpClient,
}

impl BasicAuth {
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

/// Build the `Authorization` value for a username/password pair.
pub fn basic_credentials(username: &str, password: &str) -> Result<HeaderValue, BoxError> {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Replace any caller-supplied `Authorization` header with the token's credentials.
pub fn sign(token: &TokenRecord, outbound: &mut OutboundRequest) -> Result<(), BoxError> {
    let username = token
        .username
        .as_deref()
        .ok_or("basic token record has no username")?;
    let password = token.password.as_deref().unwrap_or_default();
    outbound
        .headers_mut()
        .insert(AUTHORIZATION, basic_credentials(username, password)?);
    Ok(())
}

#[async_trait]
impl AuthStrategy for BasicAuth {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn execute(
        &self,
        request: &ProxyRequest,
        token: &TokenRecord,
        mut outbound: OutboundRequest,
    ) -> Result<UpstreamResponse, BoxError> {
        sign(token, &mut outbound)?;
        tracing::trace!(endpoint = %request.endpoint_id, "signed request with basic credentials");
        send(&self.client, outbound).await
    }
}
