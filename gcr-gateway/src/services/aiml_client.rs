//! AIML provider client
//!
//! Audio only. The request carries no callback-correlation field, so
//! requests dispatched here are reconciled by status polling alone.
//!
//! Submit: `POST /v2/generate/audio` → `{"generation_id": ..}`
//! Status: `GET /v2/generate/audio?generation_id=..`

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::reconcile::dispatcher::DispatchError;
use crate::reconcile::payload::{find_field, scalar_text, PayloadLimits};
use crate::services::transport::{RetryPolicy, RetryingClient, TransportError};
use crate::types::{CorrelationToken, GenerationKind, GenerationSpec, PollOutcome, Provider, ProviderToken};

const AUDIO_ENDPOINT: &str = "/v2/generate/audio";
const RESULT_FIELD: &str = "audio_url";

pub struct AimlClient {
    transport: RetryingClient,
    default_model: String,
    submit_policy: RetryPolicy,
    poll_policy: RetryPolicy,
    limits: PayloadLimits,
}

impl AimlClient {
    pub fn new(transport: RetryingClient, default_model: impl Into<String>, submit_policy: RetryPolicy) -> Self {
        Self {
            transport,
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
}

/// Interpret one AIML status body
pub fn interpret_status(body: &Value, limits: &PayloadLimits) -> PollOutcome {
    let status = body.get("status").and_then(Value::as_str).map(str::to_string);
    let normalized = status.as_deref().unwrap_or_default().to_ascii_lowercase();

    match normalized.as_str() {
        "completed" | "success" => match find_field(body, RESULT_FIELD, limits) {
            Some(result) => PollOutcome::Completed {
                result,
                assets: BTreeMap::new(),
                raw: body.clone(),
            },
            None => PollOutcome::Pending { status },
        },
        "failed" | "error" => PollOutcome::Failed {
            message: body
                .get("error")
                .and_then(|e| scalar_text(e).or_else(|| e.get("message").and_then(scalar_text)))
                .unwrap_or(normalized),
        },
        _ => PollOutcome::Pending { status },
    }
}

#[async_trait]
impl Provider for AimlClient {
    fn name(&self) -> &'static str {
        "aiml"
    }

    async fn submit(
        &self,
        spec: &GenerationSpec,
        token: &CorrelationToken,
    ) -> Result<Option<ProviderToken>, DispatchError> {
        if spec.kind != GenerationKind::Audio {
            return Err(DispatchError::Unsupported(format!(
                "aiml cannot generate {}",
                spec.kind
            )));
        }

        let mut body = json!({
            "model": spec.model.as_deref().unwrap_or(&self.default_model),
            "prompt": spec.prompt,
        });
        if let Some(url) = &spec.reference_url {
            body["reference_audio_url"] = json!(url);
        }

        info!(token = %token, "Submitting generation request to aiml");
        let response = self
            .transport
            .call(Method::POST, AUDIO_ENDPOINT, &body, &self.submit_policy)
            .await?;

        Ok(response
            .get("generation_id")
            .and_then(scalar_text)
            .filter(|id| !id.trim().is_empty())
            .map(ProviderToken::new))
    }

    async fn poll_status(
        &self,
        provider_token: &ProviderToken,
        _kind: GenerationKind,
    ) -> Result<PollOutcome, TransportError> {
        let query = json!({ "generation_id": provider_token.as_str() });
        let body = self
            .transport
            .call(Method::GET, AUDIO_ENDPOINT, &query, &self.poll_policy)
            .await?;
        Ok(interpret_status(&body, &self.limits))
    }
}
