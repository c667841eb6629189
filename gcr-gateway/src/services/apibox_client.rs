//! Apibox provider client
//!
//! Suno-compatible box API. Every response is wrapped in an envelope:
//! `{"code": 200, "msg": "success", "data": {...}}`; a `code` other than 200
//! means the provider refused the request even though HTTP succeeded.
//!
//! | Operation | Call                                             |
//! |-----------|--------------------------------------------------|
//! | audio     | `POST /api/v1/generate`                          |
//! | lyrics    | `POST /api/v1/lyrics`                            |
//! | status    | `POST /api/v1/status {"taskId": <provider token>}` |
//!
//! The correlation token travels as `taskId` and, truncated, inside `title`
//! (see [`marker_title`]); providers echo one or the other in callbacks.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::reconcile::dispatcher::DispatchError;
use crate::reconcile::extractor::marker_title;
use crate::reconcile::payload::{find_field, scalar_text, PayloadLimits};
use crate::services::transport::{RetryPolicy, RetryingClient, TransportError};
use crate::types::{CorrelationToken, GenerationKind, GenerationSpec, PollOutcome, Provider, ProviderToken};

const GENERATE_ENDPOINT: &str = "/api/v1/generate";
const LYRICS_ENDPOINT: &str = "/api/v1/lyrics";
const STATUS_ENDPOINT: &str = "/api/v1/status";
const ENVELOPE_OK: i64 = 200;
/// Picked up next to the main result when present
const ASSET_FIELDS: [&str; 2] = ["coverImageUrl", "videoUrl"];

/// Apibox client
pub struct ApiboxClient {
    transport: RetryingClient,
    callback_url: String,
    default_model: String,
    submit_policy: RetryPolicy,
    poll_policy: RetryPolicy,
    limits: PayloadLimits,
}

impl ApiboxClient {
    pub fn new(
        transport: RetryingClient,
        callback_url: impl Into<String>,
        default_model: impl Into<String>,
        submit_policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            callback_url: callback_url.into(),
            default_model: default_model.into(),
            submit_policy,
            poll_policy: submit_policy,
            limits: PayloadLimits::default(),
        }
    }

    /// Use a different attempt budget for status checks
    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }

    fn request_body(&self, spec: &GenerationSpec, token: &CorrelationToken) -> (&'static str, Value) {
        match spec.kind {
            GenerationKind::Audio => {
                let model = spec.model.as_deref().unwrap_or(&self.default_model);
                (
                    GENERATE_ENDPOINT,
                    json!({
                        "prompt": spec.prompt,
                        "style": spec.style.clone().unwrap_or_default(),
                        "title": marker_title(token.as_str()),
                        "customMode": true,
                        "instrumental": !spec.with_lyrics,
                        "model": normalize_model(model),
                        "taskId": token.as_str(),
                        "callBackUrl": self.callback_url,
                    }),
                )
            }
            GenerationKind::Lyrics => (
                LYRICS_ENDPOINT,
                json!({
                    "prompt": spec.prompt,
                    "taskId": token.as_str(),
                    "callBackUrl": self.callback_url,
                }),
            ),
        }
    }

    fn expected_field(kind: GenerationKind) -> &'static str {
        match kind {
            GenerationKind::Audio => "audioUrl",
            GenerationKind::Lyrics => "lyrics",
        }
    }
}

/// Map user-facing model versions to the provider's enum spelling
///
/// `v3.5` → `V3_5`, `v4` → `V4`, anything else is upper-cased.
pub fn normalize_model(model: &str) -> String {
    model.trim().to_uppercase().replace('.', "_")
}

/// Split the envelope into `data` or the provider's refusal message
fn open_envelope(body: &Value) -> Result<&Value, String> {
    let code = body.get("code").and_then(Value::as_i64);
    if code != Some(ENVELOPE_OK) {
        let msg = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(format!("code {}: {}", code.map_or("missing".to_string(), |c| c.to_string()), msg));
    }
    Ok(body.get("data").unwrap_or(&Value::Null))
}

/// Interpret a status body (already unwrapped from its envelope)
pub fn interpret_status(
    data: &Value,
    envelope_msg: Option<&str>,
    expected_field: &str,
    limits: &PayloadLimits,
) -> PollOutcome {
    let status = data.get("status").and_then(Value::as_str).map(str::to_string);
    let normalized = status.as_deref().unwrap_or_default().to_ascii_lowercase();

    if matches!(normalized.as_str(), "success" | "complete" | "completed") {
        return match find_field(data, expected_field, limits) {
            Some(result) => {
                let assets: BTreeMap<String, String> = ASSET_FIELDS
                    .iter()
                    .copied()
                    .filter(|field| *field != expected_field)
                    .filter_map(|field| {
                        find_field(data, field, limits).map(|value| (field.to_string(), value))
                    })
                    .collect();
                PollOutcome::Completed {
                    result,
                    assets,
                    raw: data.clone(),
                }
            }
            // Terminal status but the result is not attached yet
            None => PollOutcome::Pending { status },
        };
    }

    if normalized.contains("failed") || normalized.contains("error") {
        let message = ["error", "errorMessage"]
            .iter()
            .find_map(|key| data.get(*key).and_then(scalar_text))
            .or_else(|| envelope_msg.map(str::to_string))
            .unwrap_or_else(|| normalized.clone());
        return PollOutcome::Failed { message };
    }

    PollOutcome::Pending { status }
}

#[async_trait]
impl Provider for ApiboxClient {
    fn name(&self) -> &'static str {
        "apibox"
    }

    async fn submit(
        &self,
        spec: &GenerationSpec,
        token: &CorrelationToken,
    ) -> Result<Option<ProviderToken>, DispatchError> {
        let (endpoint, body) = self.request_body(spec, token);
        info!(token = %token, kind = %spec.kind, endpoint, "Submitting generation request to apibox");

        let response = self
            .transport
            .call(Method::POST, endpoint, &body, &self.submit_policy)
            .await?;

        let data = open_envelope(&response).map_err(DispatchError::Rejected)?;
        let provider_token = data
            .get("taskId")
            .and_then(scalar_text)
            .filter(|t| !t.trim().is_empty())
            .map(ProviderToken::new);

        debug!(token = %token, provider_token = ?provider_token, "Apibox accepted request");
        Ok(provider_token)
    }

    async fn poll_status(
        &self,
        provider_token: &ProviderToken,
        kind: GenerationKind,
    ) -> Result<PollOutcome, TransportError> {
        let body = json!({ "taskId": provider_token.as_str() });
        let response = self
            .transport
            .call(Method::POST, STATUS_ENDPOINT, &body, &self.poll_policy)
            .await?;

        let envelope_msg = response.get("msg").and_then(Value::as_str);
        match open_envelope(&response) {
            Ok(data) => Ok(interpret_status(
                data,
                envelope_msg,
                Self::expected_field(kind),
                &self.limits,
            )),
            Err(refusal) => {
                debug!(provider_token = %provider_token, refusal = %refusal, "Status envelope not ok");
                Ok(PollOutcome::Pending { status: None })
            }
        }
    }
}
