//! Shared harness: real axum backends and a gateway on ephemeral ports.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};

use relaygate::config::model::Config;
use relaygate::config::ConfigVersion;
use relaygate::server::{self, AppState, LoadedConfig};

pub const SESSION: &str = "alice-session";

pub struct Running {
    pub addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn serve(router: Router) -> Running {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    Running {
        addr,
        shutdown: Some(shutdown_tx),
    }
}

async fn echo(headers: HeaderMap, uri: axum::http::Uri) -> Json<serde_json::Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    Json(serde_json::json!({ "uri": uri.to_string(), "headers": headers }))
}

/// A backend answering `GET /v2/info` with `{"name": <name>}`, echoing
/// request headers on `/echo`, and 404 "not found" elsewhere.
pub async fn healthy_backend(name: &'static str) -> Running {
    let router = Router::new()
        .route("/v2/info", get(move || async move { Json(serde_json::json!({ "name": name })) }))
        .route("/echo", any(echo))
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") });
    serve(router).await
}

/// A backend answering every request with 503 and a JSON description.
pub async fn failing_backend() -> Running {
    let router = Router::new().fallback(|| async {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "description": "down" })),
        )
            .into_response()
    });
    serve(router).await
}

/// Two endpoints `a` and `b`, both signed for `alice`: `a` with an
/// OAuth-style token and `b` with basic credentials.
pub fn config_for(a: &Running, b: &Running) -> Config {
    let json = serde_json::json!({
        "endpoints": [
            { "id": "a", "url": format!("http://{}", a.addr) },
            { "id": "b", "url": format!("http://{}", b.addr), "auth_type": "basic" },
            { "id": "dead", "url": "http://127.0.0.1:9" }
        ],
        "tokens": [
            { "endpoint": "a", "user": "alice", "access_token": "token-a" },
            { "endpoint": "b", "user": "alice", "auth_type": "basic",
              "username": "alice", "password": "secret" },
            { "endpoint": "dead", "user": "alice", "access_token": "token-dead" }
        ],
        "sessions": [
            { "token": SESSION, "user": "alice" },
            { "token": "bob-session", "user": "bob" }
        ]
    });
    serde_json::from_value(json).unwrap()
}

pub struct Gateway {
    pub running: Running,
    pub state: Arc<AppState>,
}

pub async fn gateway(config: Config) -> Gateway {
    let loaded = LoadedConfig::new(config, ConfigVersion::Hash("test-hash".into()), "test");
    let state = Arc::new(AppState::new(loaded));
    let router = server::build_router(state.clone(), 1_048_576);
    Gateway {
        running: serve(router).await,
        state,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn with_session(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    builder.header("cookie", format!("relay-session={SESSION}"))
}
