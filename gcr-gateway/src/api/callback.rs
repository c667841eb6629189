//! Webhook receiver and store introspection
//!
//! - `POST /callback`: provider deliveries; any JSON body is accepted
//! - `GET /callback`: most recently stored record
//! - `GET /callback/status`: summary of every stored identifier
//! - `DELETE /callback`: clear the store

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::reconcile::RecordSummary;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub status: &'static str,
    /// Store keys the payload was indexed under
    pub stored_under: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LatestCallback {
    pub key: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub count: usize,
    pub entries: BTreeMap<String, RecordSummary>,
}

/// POST /callback
pub async fn receive_callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<CallbackAck> {
    let stored_under = state.service.receive_callback(payload).await;
    Json(CallbackAck {
        status: "received",
        stored_under,
    })
}

/// GET /callback
pub async fn latest_callback(State(state): State<AppState>) -> ApiResult<Json<LatestCallback>> {
    let (key, record) = state
        .service
        .latest()
        .await
        .ok_or_else(|| ApiError::NotFound("No callback received yet".to_string()))?;

    Ok(Json(LatestCallback {
        key,
        received_at: record.received_at,
        payload: record.payload.clone(),
    }))
}

/// GET /callback/status
pub async fn store_status(State(state): State<AppState>) -> Json<StoreStatus> {
    let entries = state.store().snapshot().await;
    Json(StoreStatus {
        count: entries.len(),
        entries,
    })
}

/// DELETE /callback
pub async fn clear_callbacks(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.store().len().await;
    state.store().clear().await;
    info!(cleared, "Correlation store cleared");
    Json(serde_json::json!({ "status": "cleared", "cleared": cleared }))
}

/// Build callback routes
pub fn callback_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/callback",
            get(latest_callback).post(receive_callback).delete(clear_callbacks),
        )
        .route("/callback/status", get(store_status))
}
