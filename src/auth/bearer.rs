//! Bearer token signing, shared by the OAuth-style and OIDC flows.
//!
//! Both flows sign with the access token held in the token record; the
//! OIDC flow honours a stored `token_type` when the issuer uses one.

use async_trait::async_trait;
use hyper::header::{HeaderValue, AUTHORIZATION};

use super::{send, AuthStrategy, OutboundRequest, UpstreamResponse};
use crate::directory::TokenRecord;
use crate::error::BoxError;
use crate::proxy::envelope::ProxyRequest;
use crate::server::HttpClient;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

pub struct BearerAuth {
    client: HttpClient,
    name: &'static str,
    honour_token_type: bool,
}

impl BearerAuth {
    #[must_use]
    pub const fn oauth(client: HttpClient) -> Self {
        Self {
            client,
            name: "oauth",
            honour_token_type: false,
        }
    }

    #[must_use]
    pub const fn oidc(client: HttpClient) -> Self {
        Self {
            client,
            name: "oidc",
            honour_token_type: true,
        }
    }

    pub fn sign(&self, token: &TokenRecord, outbound: &mut OutboundRequest) -> Result<(), BoxError> {
        let access_token = token
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or("token record has no access token")?;
        let token_type = if self.honour_token_type {
            token.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE)
        } else {
            DEFAULT_TOKEN_TYPE
        };
        let mut value = HeaderValue::from_str(&format!("{token_type} {access_token}"))?;
        value.set_sensitive(true);
        outbound.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[async_trait]
impl AuthStrategy for BearerAuth {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(
        &self,
        request: &ProxyRequest,
        token: &TokenRecord,
        mut outbound: OutboundRequest,
    ) -> Result<UpstreamResponse, BoxError> {
        self.sign(token, &mut outbound)?;
        tracing::trace!(endpoint = %request.endpoint_id, flow = self.name, "signed request with access token");
        send(&self.client, outbound).await
    }
}
