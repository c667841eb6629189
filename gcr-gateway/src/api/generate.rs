//! Generation endpoints
//!
//! `POST /api/generate` dispatches and waits; the HTTP status mirrors the
//! terminal state:
//!
//! | State                    | Status |
//! |--------------------------|--------|
//! | `completed_via_callback` | 200    |
//! | `completed_via_poll`     | 200    |
//! | `timed_out`              | 202    |
//! | `failed`                 | 502    |
//! | dispatch error           | 502    |
//!
//! A `timed_out` response carries the correlation token; the result can be
//! fetched later from `GET /api/generate/:token`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::reconcile::{MatchTier, WaitOutcome};
use crate::services::GenerationOutcome;
use crate::types::{CorrelationToken, GenerationSpec, ProviderToken};
use crate::{ApiError, ApiResult, AppState};

/// Request body for `POST /api/generate`
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(flatten)]
    pub spec: GenerationSpec,

    /// Wait deadline for this request; defaults to the sync deadline and
    /// may not exceed `max_timeout_seconds`
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub state: &'static str,
    pub correlation_token: CorrelationToken,
    pub provider_token: ProviderToken,
    /// Store key of the matched callback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_tier: Option<MatchTier>,
    /// Result field reported by a status poll (e.g. the audio URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Secondary result fields reported by a status poll
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
    /// Callback payload or raw status body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub polls: u32,
    pub elapsed_ms: u64,
}

impl GenerateResponse {
    fn from_outcome(outcome: GenerationOutcome) -> (StatusCode, Self) {
        let GenerationOutcome { receipt, report } = outcome;
        let mut response = Self {
            state: report.outcome.label(),
            correlation_token: receipt.correlation_token,
            provider_token: receipt.provider_token,
            callback_key: None,
            match_tier: None,
            result: None,
            assets: BTreeMap::new(),
            payload: None,
            error: None,
            polls: report.polls,
            elapsed_ms: report.elapsed.as_millis() as u64,
        };

        let status = match report.outcome {
            WaitOutcome::CompletedViaCallback { key, record, tier } => {
                response.callback_key = Some(key);
                response.match_tier = tier;
                response.payload = Some(record.payload.clone());
                StatusCode::OK
            }
            WaitOutcome::CompletedViaPoll { result, assets, raw } => {
                response.result = Some(result);
                response.assets = assets;
                response.payload = Some(raw);
                StatusCode::OK
            }
            WaitOutcome::Failed { message } => {
                response.error = Some(message);
                StatusCode::BAD_GATEWAY
            }
            WaitOutcome::TimedOut { .. } => StatusCode::ACCEPTED,
        };

        (status, response)
    }
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub token: String,
    pub key: String,
    pub match_tier: MatchTier,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

/// POST /api/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Response> {
    if request.spec.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt cannot be empty".to_string()));
    }
    let deadline = match request.timeout_seconds {
        Some(0) => {
            return Err(ApiError::BadRequest(
                "timeout_seconds must be greater than zero".to_string(),
            ))
        }
        Some(secs) => {
            let requested = gcr_common::time::secs_to_duration(secs);
            if requested > state.max_deadline {
                return Err(ApiError::BadRequest(format!(
                    "timeout_seconds must not exceed {}",
                    state.max_deadline.as_secs()
                )));
            }
            requested
        }
        None => state.sync_deadline,
    };

    let outcome = match state.service.generate(&request.spec, Some(deadline)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    let (status, body) = GenerateResponse::from_outcome(outcome);
    match &body.error {
        Some(message) => {
            warn!(token = %body.correlation_token, error = %message, "Provider reported failure");
            state.record_error(message.clone()).await;
        }
        None => info!(token = %body.correlation_token, state = body.state, "Generate request answered"),
    }

    Ok((status, Json(body)).into_response())
}

/// GET /api/generate/:token
pub async fn lookup(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<LookupResponse>> {
    let hit = state
        .service
        .lookup(&token)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No callback matches {}", token)))?;

    Ok(Json(LookupResponse {
        token,
        key: hit.key,
        match_tier: hit.tier,
        received_at: hit.record.received_at,
        payload: hit.record.payload.clone(),
    }))
}

/// Build generation routes
pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generate/:token", get(lookup))
}
