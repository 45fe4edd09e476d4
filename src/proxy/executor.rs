//! Single-target request execution.
//!
//! [`Executor::execute`] turns one [`ProxyRequest`] into a
//! [`ProxyResponse`] on every path: a request that cannot be built, a
//! user with no token for the endpoint, a transport failure and a
//! deadline expiry all come back as data. The response body is read to
//! the end here, so the caller never holds an open upstream stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use super::envelope::{ProxyRequest, ProxyResponse};
use super::headers::forward_standard_headers;
use crate::auth::{AuthRegistry, OutboundRequest};
use crate::directory::TokenStore;
use crate::error::BoxError;

#[derive(Clone)]
pub struct Executor {
    tokens: Arc<dyn TokenStore>,
    auth: Arc<AuthRegistry>,
    timeout: Option<Duration>,
    strip_hop_by_hop: bool,
}

impl Executor {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStore>, auth: Arc<AuthRegistry>) -> Self {
        Self {
            tokens,
            auth,
            timeout: None,
            strip_hop_by_hop: true,
        }
    }

    /// Bound each target's exchange. Without this the executor waits
    /// for the backend indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_strip_hop_by_hop(mut self, strip: bool) -> Self {
        self.strip_hop_by_hop = strip;
        self
    }

    fn build_outbound(request: &ProxyRequest) -> Result<OutboundRequest, hyper::http::Error> {
        hyper::Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str())
            .body(Full::new(request.body.clone()))
    }

    pub async fn execute(&self, request: ProxyRequest) -> ProxyResponse {
        let start = Instant::now();

        let mut outbound = match Self::build_outbound(&request) {
            Ok(r) => r,
            Err(e) => {
                return ProxyResponse::failed(request, e.to_string(), start.elapsed());
            }
        };

        let token = match self.tokens.token(&request.endpoint_id, &request.user_id) {
            Ok(t) => t,
            Err(e) => {
                return ProxyResponse::failed(request, e.to_string(), start.elapsed());
            }
        };

        forward_standard_headers(&request.headers, outbound.headers_mut(), self.strip_hop_by_hop);

        let strategy = self.auth.strategy(token.auth_type);
        let exchange = async {
            let response = strategy.execute(&request, &token, outbound).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<(StatusCode, Bytes), BoxError>((status, body))
        };

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| Err("request timed out".into())),
            None => exchange.await,
        };
        let latency = start.elapsed();

        match result {
            Ok((status, body)) => ProxyResponse {
                request,
                status: Some(status),
                body,
                error: None,
                latency,
            },
            Err(e) => ProxyResponse::transport_error(request, e.to_string(), latency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthStrategy, UpstreamResponse};
    use crate::config::model::AuthType;
    use crate::directory::TokenRecord;
    use crate::error::RelayError;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use std::sync::Mutex;

    struct Tokens;

    impl TokenStore for Tokens {
        fn token(&self, endpoint_id: &str, user_id: &str) -> Result<TokenRecord, RelayError> {
            if user_id == "alice" {
                Ok(TokenRecord {
                    auth_type: if endpoint_id == "basic" {
                        AuthType::Basic
                    } else {
                        AuthType::Oauth
                    },
                    username: None,
                    password: None,
                    access_token: Some("t".into()),
                    token_type: None,
                })
            } else {
                Err(RelayError::TokenNotFound {
                    endpoint: endpoint_id.into(),
                    user: user_id.into(),
                })
            }
        }
    }

    /// Answers with a canned response and records the headers it saw.
    struct Canned {
        name: &'static str,
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Option<HeaderMap>>,
    }

    impl Canned {
        fn new(name: &'static str, status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                status,
                body,
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl AuthStrategy for Canned {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            _request: &ProxyRequest,
            _token: &TokenRecord,
            outbound: OutboundRequest,
        ) -> Result<UpstreamResponse, BoxError> {
            *self.seen.lock().unwrap() = Some(outbound.headers().clone());
            let body = Full::new(Bytes::from_static(self.body.as_bytes()))
                .map_err(|never| match never {})
                .boxed_unsync();
            Ok(hyper::Response::builder()
                .status(self.status)
                .body(body)
                .unwrap())
        }
    }

    struct Failing;

    #[async_trait]
    impl AuthStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn execute(
            &self,
            _request: &ProxyRequest,
            _token: &TokenRecord,
            _outbound: OutboundRequest,
        ) -> Result<UpstreamResponse, BoxError> {
            Err("connection refused".into())
        }
    }

    struct Hanging;

    #[async_trait]
    impl AuthStrategy for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn execute(
            &self,
            _request: &ProxyRequest,
            _token: &TokenRecord,
            _outbound: OutboundRequest,
        ) -> Result<UpstreamResponse, BoxError> {
            std::future::pending().await
        }
    }

    fn request(endpoint: &str, user: &str) -> ProxyRequest {
        let mut headers = HeaderMap::new();
        headers.insert("referer", HeaderValue::from_static("https://console.local"));
        headers.insert("x-relay-endpoints", HeaderValue::from_static("a,b"));
        headers.insert("accept", HeaderValue::from_static("application/json"));
        ProxyRequest {
            endpoint_id: endpoint.into(),
            user_id: user.into(),
            result_key: None,
            method: Method::GET,
            url: url::Url::parse("https://api.example.com/v2/info").unwrap(),
            body: Bytes::new(),
            headers,
        }
    }

    fn executor(fallback: Arc<dyn AuthStrategy>) -> Executor {
        Executor::new(Arc::new(Tokens), Arc::new(AuthRegistry::new(fallback)))
    }

    #[tokio::test]
    async fn records_status_and_body() {
        let canned = Canned::new("ok", StatusCode::OK, r#"{"ok":true}"#);
        let response = executor(canned).execute(request("a", "alice")).await;
        assert_eq!(response.status, Some(StatusCode::OK));
        assert_eq!(&response.body[..], br#"{"ok":true}"#);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn forwards_only_standard_headers() {
        let canned = Canned::new("ok", StatusCode::OK, "{}");
        let _ = executor(canned.clone()).execute(request("a", "alice")).await;
        let seen = canned.seen.lock().unwrap().clone().unwrap();
        assert!(seen.get("referer").is_none());
        assert!(seen.get("x-relay-endpoints").is_none());
        assert_eq!(seen.get("accept").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn strategy_is_selected_by_token_auth_type() {
        let oauth = Canned::new("oauth", StatusCode::OK, "\"oauth\"");
        let basic = Canned::new("basic", StatusCode::OK, "\"basic\"");
        let registry = AuthRegistry::new(oauth).register(AuthType::Basic, basic);
        let executor = Executor::new(Arc::new(Tokens), Arc::new(registry));

        let response = executor.execute(request("basic", "alice")).await;
        assert_eq!(&response.body[..], b"\"basic\"");
        let response = executor.execute(request("other", "alice")).await;
        assert_eq!(&response.body[..], b"\"oauth\"");
    }

    #[tokio::test]
    async fn missing_token_is_reported_without_network() {
        let canned = Canned::new("ok", StatusCode::OK, "{}");
        let response = executor(canned.clone()).execute(request("a", "mallory")).await;
        assert!(response.status.is_none());
        assert!(response.error.unwrap().contains("No token found"));
        assert!(canned.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_error_becomes_500_with_text_body() {
        let response = executor(Arc::new(Failing)).execute(request("a", "alice")).await;
        assert_eq!(response.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(&response.body[..], b"connection refused");
        assert_eq!(response.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_transport_error() {
        let response = executor(Arc::new(Hanging))
            .with_timeout(Some(Duration::from_millis(50)))
            .execute(request("a", "alice"))
            .await;
        assert_eq!(response.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(response.error.as_deref(), Some("request timed out"));
    }
}
