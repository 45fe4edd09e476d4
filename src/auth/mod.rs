//! Per-endpoint request signing.
//!
//! Every auth type is an [`AuthStrategy`]: it decorates the unsigned
//! outbound request with the caller's credentials and performs the
//! network call. [`AuthRegistry`] is the lookup table the executor
//! consults with the auth type of the resolved token record. Token
//! refresh is not handled here; strategies sign with what the token
//! store hands them.

pub mod basic;
pub mod bearer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

use crate::config::model::AuthType;
use crate::directory::TokenRecord;
use crate::error::BoxError;
use crate::proxy::envelope::ProxyRequest;
use crate::server::HttpClient;

pub type OutboundRequest = hyper::Request<Full<Bytes>>;
pub type UpstreamBody = UnsyncBoxBody<Bytes, BoxError>;
pub type UpstreamResponse = hyper::Response<UpstreamBody>;

// async_trait keeps the trait object safe: the registry stores Arc<dyn AuthStrategy>.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        request: &ProxyRequest,
        token: &TokenRecord,
        outbound: OutboundRequest,
    ) -> Result<UpstreamResponse, BoxError>;
}

/// Send a signed request and erase the hyper body type.
pub async fn send(
    client: &HttpClient,
    outbound: OutboundRequest,
) -> Result<UpstreamResponse, BoxError> {
    let response = client.request(outbound).await?;
    Ok(response.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed_unsync()))
}

pub struct AuthRegistry {
    strategies: HashMap<AuthType, Arc<dyn AuthStrategy>>,
    fallback: Arc<dyn AuthStrategy>,
}

impl AuthRegistry {
    /// An empty table; any auth type resolves to `fallback`.
    #[must_use]
    pub fn new(fallback: Arc<dyn AuthStrategy>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    #[must_use]
    pub fn register(mut self, auth_type: AuthType, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.strategies.insert(auth_type, strategy);
        self
    }

    /// Basic, OAuth-style and OIDC signing over the shared HTTP client.
    /// Unregistered auth types fall back to OAuth-style bearer signing.
    #[must_use]
    pub fn with_defaults(client: &HttpClient) -> Self {
        let oauth: Arc<dyn AuthStrategy> = Arc::new(bearer::BearerAuth::oauth(client.clone()));
        Self::new(Arc::clone(&oauth))
            .register(AuthType::Basic, Arc::new(basic::BasicAuth::new(client.clone())))
            .register(AuthType::Oauth, oauth)
            .register(AuthType::Oidc, Arc::new(bearer::BearerAuth::oidc(client.clone())))
    }

    #[must_use]
    pub fn strategy(&self, auth_type: AuthType) -> &Arc<dyn AuthStrategy> {
        self.strategies.get(&auth_type).unwrap_or(&self.fallback)
    }
}

impl std::fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self
            .strategies
            .iter()
            .map(|(k, v)| (k.as_str(), v.name()))
            .collect();
        registered.sort_unstable();
        f.debug_struct("AuthRegistry")
            .field("strategies", &registered)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
