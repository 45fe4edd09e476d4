//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the loaded
//! config and endpoint directory, auth strategies, stats, and
//! uptime), [`build_router`] for constructing the Axum router with
//! its session and middleware layers, [`build_http_client`] for the
//! connection-pooled hyper client, and [`shutdown_signal`] for
//! SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::routing::{any, get, post};
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthRegistry;
use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::directory::StaticDirectory;
use crate::health::health_handler;
use crate::middleware::session::require_session;
use crate::proxy::{batch_handler, proxy_handler};

/// A config snapshot together with the directory derived from it.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub directory: Arc<StaticDirectory>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    #[must_use]
    pub fn new(config: Config, version: ConfigVersion, source_name: impl Into<String>) -> Self {
        let directory = Arc::new(StaticDirectory::from_config(&config));
        Self {
            config: Arc::new(config),
            directory,
            version,
            source_name: source_name.into(),
            loaded_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct Stats {
    /// Proxy or batch requests answered with a rendered result.
    pub dispatched: AtomicU64,
    /// Proxy or batch requests rejected before or during dispatch.
    pub failed: AtomicU64,
    /// Individual targets that never produced a backend response.
    pub target_failures: AtomicU64,
    pub config_reloads: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            target_failures: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: RwLock<LoadedConfig>,
    pub auth: Arc<AuthRegistry>,
    pub start_time: Instant,
    /// Fixed at startup; the router is built once.
    pub proxy_prefix: String,
    pub stats: Stats,
}

impl AppState {
    /// State with the default auth strategies bound to a fresh client.
    #[must_use]
    pub fn new(loaded: LoadedConfig) -> Self {
        let auth = Arc::new(AuthRegistry::with_defaults(&build_http_client()));
        Self::with_auth(loaded, auth)
    }

    #[must_use]
    pub fn with_auth(loaded: LoadedConfig, auth: Arc<AuthRegistry>) -> Self {
        let proxy_prefix = loaded.config.server.proxy_prefix.clone();
        Self {
            config: RwLock::new(loaded),
            auth,
            start_time: Instant::now(),
            proxy_prefix,
            stats: Stats::new(),
        }
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // Several rustls crypto providers may be compiled in through transitive
    // features; pin `ring` so provider auto-detection cannot fail.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let prefix = state.proxy_prefix.clone();

    Router::new()
        .route("/batch", post(batch_handler))
        .route(&prefix, any(proxy_handler))
        .route(&format!("{prefix}/{{*path}}"), any(proxy_handler))
        .route_layer(from_fn_with_state(state.clone(), require_session))
        .route("/health", get(health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
