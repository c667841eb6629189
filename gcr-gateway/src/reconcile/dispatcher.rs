//! Request dispatch
//!
//! Mints the correlation token (unless the caller brought one), resolves the
//! reference asset, hands the request to the configured provider and returns
//! the token pair. Nothing is persisted here; bookkeeping after dispatch
//! belongs to the waiter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::reference_lookup::ReferenceAssetLookup;
use crate::services::transport::TransportError;
use crate::types::{CorrelationToken, GenerationKind, GenerationSpec, Provider, ProviderToken};

/// Dispatch failures; surfaced immediately, never retried by the dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP succeeded but the provider refused the request
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Provider response carried no provider token")]
    MissingProviderToken,

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Token pair for one dispatched request
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub correlation_token: CorrelationToken,
    pub provider_token: ProviderToken,
    pub kind: GenerationKind,
    pub dispatched_at: DateTime<Utc>,
}

/// Submits generation requests to one provider
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    reference: Arc<dyn ReferenceAssetLookup>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn Provider>, reference: Arc<dyn ReferenceAssetLookup>) -> Self {
        Self { provider, reference }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub async fn dispatch(&self, spec: &GenerationSpec) -> Result<DispatchReceipt, DispatchError> {
        let correlation_token = spec
            .correlation_token
            .clone()
            .filter(|t| !t.as_str().trim().is_empty())
            .unwrap_or_else(CorrelationToken::mint);

        let mut spec = spec.clone();
        if spec.reference_url.is_none() {
            spec.reference_url = Some(self.reference.lookup(&spec.prompt).await);
        }
        spec.correlation_token = Some(correlation_token.clone());

        let dispatched_at = gcr_common::time::now();
        let provider_token = match self.provider.submit(&spec, &correlation_token).await {
            Ok(Some(token)) if !token.as_str().trim().is_empty() => token,
            Ok(_) => {
                warn!(token = %correlation_token, provider = self.provider.name(), "Provider returned no token");
                return Err(DispatchError::MissingProviderToken);
            }
            Err(e) => {
                warn!(token = %correlation_token, provider = self.provider.name(), error = %e, "Dispatch failed");
                return Err(e);
            }
        };

        info!(
            token = %correlation_token,
            provider_token = %provider_token,
            provider = self.provider.name(),
            kind = %spec.kind,
            "Generation request dispatched"
        );

        Ok(DispatchReceipt {
            correlation_token,
            provider_token,
            kind: spec.kind,
            dispatched_at,
        })
    }
}
