//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (e.g., "ok", "degraded")
    pub status: String,
    /// Module name ("gcr-gateway")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git revision, build time and profile of the running binary
    pub build: BuildInfo,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Configured provider strategy
    pub provider: String,
    /// Identifiers currently held in the correlation store
    pub tracked_identifiers: usize,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub git_hash: &'static str,
    pub timestamp: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            git_hash: env!("GCR_GIT_HASH"),
            timestamp: env!("GCR_BUILD_TIMESTAMP"),
            profile: env!("GCR_BUILD_PROFILE"),
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "gcr-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: BuildInfo::current(),
        uptime_seconds,
        provider: state.service.provider_name().to_string(),
        tracked_identifiers: state.store().len().await,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
