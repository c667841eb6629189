//! Configuration resolution for gcr-gateway
//!
//! Turns the bootstrap [`TomlConfig`] into runtime components. The provider
//! API key is resolved with ENV → TOML priority.

use gcr_common::config::{is_valid_key, ProviderKind, TomlConfig};
use gcr_common::time::secs_to_duration;
use gcr_common::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::reconcile::{CorrelationStore, PayloadLimits, WaitConfig};
use crate::services::{
    AimlClient, ApiboxClient, GenerationService, RetryPolicy, RetryingClient, StaticReferenceAsset,
};
use crate::types::Provider;

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "GCR_PROVIDER_API_KEY";

/// Resolve the provider API key
///
/// **Priority:** ENV → TOML. A missing key is not fatal: requests go out
/// unauthenticated and the provider rejects them.
pub fn resolve_provider_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .provider
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Provider API key found in both {} and TOML config. Using environment.",
            API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("Provider API key loaded from environment variable");
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("Provider API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "Provider API key not configured. Set {} or provider.api_key in gcr-gateway.toml",
        API_KEY_ENV
    );
    None
}

pub fn wait_config(toml_config: &TomlConfig) -> WaitConfig {
    WaitConfig {
        poll_interval: secs_to_duration(toml_config.reconciliation.poll_interval_seconds),
        deadline: secs_to_duration(toml_config.reconciliation.deadline_seconds),
    }
}

pub fn payload_limits(toml_config: &TomlConfig) -> PayloadLimits {
    PayloadLimits {
        max_depth: toml_config.reconciliation.max_payload_depth,
        max_nodes: toml_config.reconciliation.max_payload_nodes,
    }
}

pub fn retry_policy(toml_config: &TomlConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: toml_config.transport.max_retries,
        retry_delay: secs_to_duration(toml_config.transport.retry_delay_seconds),
    }
}

/// Attempt budget for a single status check
///
/// Shares the retry delay with submits; a check that still fails is simply
/// retried by the waiter's next poll.
pub fn status_retry_policy(toml_config: &TomlConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: toml_config.transport.status_max_retries,
        ..retry_policy(toml_config)
    }
}

/// Build the provider selected by `[provider] kind`
pub fn build_provider(toml_config: &TomlConfig, api_key: Option<String>) -> Result<Arc<dyn Provider>> {
    let provider = &toml_config.provider;
    let transport = RetryingClient::new(
        provider.base_url.clone(),
        api_key,
        secs_to_duration(provider.request_timeout_seconds),
    )
    .map_err(|e| Error::Internal(format!("HTTP client init failed: {}", e)))?;
    let policy = retry_policy(toml_config);
    let status_policy = status_retry_policy(toml_config);
    let limits = payload_limits(toml_config);

    let built: Arc<dyn Provider> = match provider.kind {
        ProviderKind::Apibox => Arc::new(
            ApiboxClient::new(
                transport,
                provider.callback_url.clone(),
                provider.model.clone(),
                policy,
            )
            .with_poll_policy(status_policy)
            .with_limits(limits),
        ),
        ProviderKind::Aiml => Arc::new(
            AimlClient::new(transport, provider.model.clone(), policy)
                .with_poll_policy(status_policy)
                .with_limits(limits),
        ),
    };

    info!(
        provider = built.name(),
        base_url = %provider.base_url,
        max_retries = policy.max_retries,
        status_max_retries = status_policy.max_retries,
        "Provider client ready"
    );
    Ok(built)
}

/// Wire the full service graph from configuration
pub fn build_service(toml_config: &TomlConfig, store: Arc<CorrelationStore>) -> Result<GenerationService> {
    toml_config.reconciliation.validate()?;

    let api_key = resolve_provider_api_key(toml_config);
    let provider = build_provider(toml_config, api_key)?;
    let reference = Arc::new(StaticReferenceAsset::new(
        toml_config.reference.default_url.clone(),
    ));

    Ok(GenerationService::new(
        store,
        provider,
        reference,
        wait_config(toml_config),
        payload_limits(toml_config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_env_key_wins_over_toml() {
        let mut config = TomlConfig::default();
        config.provider.api_key = Some("toml-key".to_string());

        std::env::set_var(API_KEY_ENV, "env-key");
        assert_eq!(resolve_provider_api_key(&config).as_deref(), Some("env-key"));

        std::env::set_var(API_KEY_ENV, "   ");
        assert_eq!(resolve_provider_api_key(&config).as_deref(), Some("toml-key"));

        std::env::remove_var(API_KEY_ENV);
        assert_eq!(resolve_provider_api_key(&config).as_deref(), Some("toml-key"));

        config.provider.api_key = None;
        assert_eq!(resolve_provider_api_key(&config), None);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = TomlConfig::default();
        config.reconciliation.poll_interval_seconds = 1;
        config.reconciliation.deadline_seconds = 3;
        config.transport.max_retries = 4;

        let wait = wait_config(&config);
        assert_eq!(wait.poll_interval, Duration::from_secs(1));
        assert_eq!(wait.deadline, Duration::from_secs(3));
        assert_eq!(retry_policy(&config).max_retries, 4);
        assert_eq!(payload_limits(&config).max_depth, 64);

        let status = status_retry_policy(&config);
        assert_eq!(status.max_retries, 1);
        assert_eq!(status.retry_delay, retry_policy(&config).retry_delay);
    }

    #[test]
    fn test_provider_selected_by_kind() {
        let mut config = TomlConfig::default();
        assert_eq!(build_provider(&config, None).unwrap().name(), "apibox");

        config.provider.kind = ProviderKind::Aiml;
        assert_eq!(build_provider(&config, None).unwrap().name(), "aiml");
    }

    #[test]
    #[serial]
    fn test_build_service_rejects_zero_deadline() {
        let mut config = TomlConfig::default();
        config.reconciliation.deadline_seconds = 0;
        let result = build_service(&config, Arc::new(CorrelationStore::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
