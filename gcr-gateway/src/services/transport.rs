//! Retrying HTTP transport for provider APIs
//!
//! Every outbound provider call goes through [`RetryingClient::call`]:
//! 1. Send the request
//! 2. 2xx → parse the body as JSON and return it
//! 3. 503 or a connection-level error (including a body cut off mid-read) →
//!    sleep `retry_delay`, retry, up to `max_retries` attempts in total
//! 4. Any other status → fail immediately, no retry
//! 5. Body that does not parse → fail immediately with `Parse`
//!
//! The delay is fixed; there is no backoff growth.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("gcr-gateway/", env!("CARGO_PKG_VERSION"));

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure on the last attempt
    #[error("Network error: {0}")]
    Network(String),

    /// 503 on every attempt
    #[error("Service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    /// Non-transient, non-2xx status
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Response body was not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::ServiceUnavailable { .. }
        )
    }
}

/// Attempt budget for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (a value of 0 is treated as 1)
    pub max_retries: u32,
    /// Fixed sleep between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// HTTP client bound to one provider base URL
#[derive(Clone)]
pub struct RetryingClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RetryingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Call `endpoint` (a path under the base URL)
    ///
    /// For `GET` the top-level fields of `payload` become query parameters;
    /// for other methods `payload` is sent as the JSON body.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        payload: &Value,
        policy: &RetryPolicy,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let max_attempts = policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(%method, url = %url, attempt, max_attempts, "Calling provider");

            let err = match self.send_once(method.clone(), &url, payload).await {
                Ok(response) => match read_response(response, attempt).await {
                    Ok(body) => return Ok(body),
                    Err(e) => e,
                },
                Err(e) => TransportError::Network(e.to_string()),
            };

            if !err.is_transient() {
                debug!(url = %url, attempt, error = %err, "Provider call failed, not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(url = %url, attempt, error = %err, "Provider call failed, retries exhausted");
                return Err(err);
            }

            warn!(
                url = %url,
                attempt,
                retry_delay_ms = policy.retry_delay.as_millis() as u64,
                error = %err,
                "Transient provider failure, will retry"
            );
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        payload: &Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request = if method == Method::GET {
            request.query(&query_pairs(payload))
        } else {
            request.json(payload)
        };

        request.send().await
    }
}

/// Turn one response into a JSON body or a classified error
async fn read_response(response: reqwest::Response, attempt: u32) -> Result<Value, TransportError> {
    let status = response.status();

    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(TransportError::ServiceUnavailable { attempts: attempt });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            code: status.as_u16(),
            body: truncate(&body),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    serde_json::from_str(&body)
        .map_err(|e| TransportError::Parse(format!("{} (body: {})", e, truncate(&body))))
}

fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    payload
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncate(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
