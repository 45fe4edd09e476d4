//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source metadata, the number of loaded
//! endpoints and sessions, and cumulative dispatch statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub commit: String,
    pub build_profile: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub proxy_prefix: String,
    pub endpoints: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_dispatched: u64,
    pub requests_failed: u64,
    pub target_failures: u64,
    pub config_reloads: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = {
        let loaded = state.config.read().await;
        ConfigHealth {
            source: loaded.source_name.clone(),
            version: loaded.version.short().to_string(),
            loaded_ago_seconds: loaded.loaded_at.elapsed().as_secs(),
            proxy_prefix: state.proxy_prefix.clone(),
            endpoints: loaded.directory.len(),
            sessions: loaded.config.sessions.len(),
        }
    };

    let stats = &state.stats;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("RELAYGATE_GIT_SHORT").to_string(),
        build_profile: env!("RELAYGATE_BUILD_PROFILE").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config,
        stats: StatsResponse {
            requests_dispatched: stats.dispatched.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
            target_failures: stats.target_failures.load(Ordering::Relaxed),
            config_reloads: stats.config_reloads.load(Ordering::Relaxed),
        },
    })
}
