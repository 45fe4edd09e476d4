//! `relaygate run`: start the gateway.
//!
//! Loads configuration from a file (with an optional fallback file),
//! starts the Axum HTTP server with graceful shutdown, and spawns a
//! background config refresh loop for hot-reloading the endpoint,
//! token and session tables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::sources;
use crate::config::{ConfigResolver, ConfigSource};
use crate::error::RelayError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};

const CANDIDATES: [&str; 4] = [
    "relaygate.yaml",
    "relaygate.yml",
    "relaygate.json",
    "relaygate.toml",
];

pub async fn execute(args: RunArgs) -> Result<(), RelayError> {
    logging::init(&args.log_level, logging::resolve_format(args.pretty, args.json));

    let resolver = resolve_config_sources(&args).await?;
    let (mut config, version) = resolver.load_with_fallback().await?;

    if args.timeout.is_some() {
        config.defaults.timeout = args.timeout;
    }
    let timeout_override = args.timeout;

    let endpoint_count = config.endpoints.len();
    let loaded = LoadedConfig::new(config, version, resolver.primary_name());
    let state = Arc::new(AppState::new(loaded));

    // Dropping shutdown_tx closes the channel and stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_state = state.clone();
    let poll_interval = args.poll_interval;
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(
            refresh_state,
            resolver,
            timeout_override,
            poll_interval,
            shutdown_rx,
        )
        .await;
    });

    let prefix = state.proxy_prefix.clone();
    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        endpoints = endpoint_count,
        proxy_prefix = %prefix,
        "relaygate started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("relaygate stopped");
    Ok(())
}

async fn resolve_config_sources(args: &RunArgs) -> Result<ConfigResolver, RelayError> {
    let primary = resolve_file_source(args.config.as_deref()).await?.ok_or_else(|| {
        RelayError::NoConfigSource {
            hint: "Provide --config <file> or create ./relaygate.yaml.\n  \
                   Run 'relaygate init' to create a config file."
                .into(),
        }
    })?;

    let fallback = args
        .fallback_config
        .as_deref()
        .map(create_file_source)
        .transpose()?;

    Ok(ConfigResolver::new(primary, fallback))
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn ConfigSource>>, RelayError> {
    if let Some(path) = explicit {
        return create_file_source(path).map(Some);
    }

    for name in &CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return create_file_source(&path).map(Some);
        }
    }

    Ok(None)
}

pub fn create_file_source(path: &Path) -> Result<Box<dyn ConfigSource>, RelayError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(sources::yaml::new(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(sources::json::new(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(sources::toml_source::new(path.to_path_buf()))),

        other => Err(RelayError::UnsupportedFormat(other.to_string())),
    }
}

/// Check the primary source once and swap in a new snapshot when its
/// content changed. Returns whether a reload happened; on error the
/// current snapshot stays in place.
pub async fn refresh_once(
    state: &AppState,
    resolver: &ConfigResolver,
    timeout_override: Option<u64>,
) -> Result<bool, RelayError> {
    let current_version = state.config.read().await.version.clone();

    if !resolver.primary().has_changed(&current_version).await? {
        return Ok(false);
    }

    tracing::info!("config change detected, reloading");
    let (mut config, version) = resolver.load_with_fallback().await?;
    if timeout_override.is_some() {
        config.defaults.timeout = timeout_override;
    }
    if config.server.proxy_prefix != state.proxy_prefix {
        tracing::warn!(
            active = %state.proxy_prefix,
            configured = %config.server.proxy_prefix,
            "proxy prefix changes take effect on restart"
        );
    }

    let endpoint_count = config.endpoints.len();
    let loaded = LoadedConfig::new(config, version, resolver.primary_name());
    let short = loaded.version.short().to_string();
    *state.config.write().await = loaded;
    state.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
    tracing::info!(endpoints = endpoint_count, version = %short, "config reloaded");
    Ok(true)
}

async fn config_refresh_loop(
    state: Arc<AppState>,
    resolver: ConfigResolver,
    timeout_override: Option<u64>,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        if let Err(e) = refresh_once(&state, &resolver, timeout_override).await {
            tracing::error!(error = %e, "config reload failed, keeping current config");
        }
    }
}
