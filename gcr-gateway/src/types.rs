//! Core types and the provider trait
//!
//! Defines the identifiers that flow through reconciliation and the
//! `Provider` seam that each external generation API implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::reconcile::dispatcher::DispatchError;
use crate::services::transport::TransportError;

// ============================================================================
// Identifiers
// ============================================================================

/// Caller-side identifier for one generation request
///
/// Minted at dispatch time when the caller does not supply one; immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a fresh random token
    pub fn mint() -> Self {
        Self(gcr_common::uuid_utils::generate().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-side identifier for the same request
///
/// May differ from the correlation token in casing, length, or by wrapping
/// it inside a longer provider-chosen label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderToken(String);

impl ProviderToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Generation requests
// ============================================================================

/// What the provider is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    #[default]
    Audio,
    Lyrics,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationKind::Audio => f.write_str("audio"),
            GenerationKind::Lyrics => f.write_str("lyrics"),
        }
    }
}

/// Caller-supplied generation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSpec {
    #[serde(default)]
    pub kind: GenerationKind,

    pub prompt: String,

    /// Genre/style hint
    #[serde(default)]
    pub style: Option<String>,

    #[serde(default = "default_with_lyrics")]
    pub with_lyrics: bool,

    /// Overrides the configured provider model
    #[serde(default)]
    pub model: Option<String>,

    /// Caller-chosen correlation token; minted when absent
    #[serde(default)]
    pub correlation_token: Option<CorrelationToken>,

    /// Reference asset URL; looked up when absent
    #[serde(default)]
    pub reference_url: Option<String>,
}

fn default_with_lyrics() -> bool {
    true
}

impl GenerationSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            with_lyrics: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// Provider seam
// ============================================================================

/// Result of one status poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Terminal success with the expected result field present
    Completed {
        /// Value of the expected result field (e.g. the audio URL)
        result: String,
        /// Secondary result fields present in the body, keyed by field name
        /// (cover image, video)
        assets: BTreeMap<String, String>,
        /// Full status body for the caller
        raw: Value,
    },
    /// Terminal provider-reported failure
    Failed { message: String },
    /// Anything else; the waiter keeps going
    Pending { status: Option<String> },
}

/// One external generation API contract
///
/// Implementations are selected by configuration, never by trying several
/// request shapes until one is accepted.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Submit a request with `token` embedded as the callback-correlation field
    ///
    /// Returns `Ok(None)` when the provider accepted the request but its
    /// response carries no token of its own.
    async fn submit(
        &self,
        spec: &GenerationSpec,
        token: &CorrelationToken,
    ) -> Result<Option<ProviderToken>, DispatchError>;

    /// Query the status endpoint once (the transport may retry internally)
    async fn poll_status(
        &self,
        provider_token: &ProviderToken,
        kind: GenerationKind,
    ) -> Result<PollOutcome, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_tokens_differ() {
        assert_ne!(CorrelationToken::mint(), CorrelationToken::mint());
    }

    #[test]
    fn test_spec_deserialize_defaults() {
        let spec: GenerationSpec =
            serde_json::from_value(serde_json::json!({"prompt": "city pop at dusk"})).unwrap();
        assert_eq!(spec.kind, GenerationKind::Audio);
        assert!(spec.with_lyrics);
        assert!(spec.correlation_token.is_none());
    }

    #[test]
    fn test_tokens_serialize_as_plain_strings() {
        let token = CorrelationToken::new("abc123");
        assert_eq!(serde_json::to_value(&token).unwrap(), serde_json::json!("abc123"));
    }
}
