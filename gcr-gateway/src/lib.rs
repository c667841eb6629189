//! gcr-gateway library interface
//!
//! Generation-callback reconciliation: dispatches generation requests to an
//! external provider and ties each one to its asynchronous result, whether
//! that arrives by webhook or by status polling.

pub mod api;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::reconcile::CorrelationStore;
use crate::services::GenerationService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GenerationService>,
    /// Deadline for `POST /api/generate` when the caller gives none
    pub sync_deadline: Duration,
    /// Largest `timeout_seconds` a caller may ask for
    pub max_deadline: Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(service: Arc<GenerationService>, sync_deadline: Duration, max_deadline: Duration) -> Self {
        Self {
            service,
            sync_deadline,
            max_deadline,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        self.service.store()
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::callback_routes())
        .merge(api::generate_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
