//! Generation service
//!
//! Entry point for both directions of traffic: outbound requests
//! (dispatch + wait) and inbound provider callbacks (extract + store).
//! One instance per process, shared by all HTTP handlers.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::reconcile::{
    match_token, CallbackRecord, CorrelationStore, DispatchError, DispatchReceipt, Dispatcher,
    IdentifierExtractor, MatchHit, PayloadLimits, ReconciliationWaiter, WaitConfig, WaitReport,
};
use crate::services::reference_lookup::ReferenceAssetLookup;
use crate::types::{GenerationSpec, Provider};

/// Prefix of keys minted for callbacks that carry no identifier
pub const SYNTHETIC_KEY_PREFIX: &str = "cb";

/// Dispatch receipt plus the terminal wait result
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub receipt: DispatchReceipt,
    pub report: WaitReport,
}

pub struct GenerationService {
    store: Arc<CorrelationStore>,
    dispatcher: Dispatcher,
    waiter: ReconciliationWaiter,
    extractor: IdentifierExtractor,
    wait: WaitConfig,
}

impl GenerationService {
    pub fn new(
        store: Arc<CorrelationStore>,
        provider: Arc<dyn Provider>,
        reference: Arc<dyn ReferenceAssetLookup>,
        wait: WaitConfig,
        limits: PayloadLimits,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&provider), reference),
            waiter: ReconciliationWaiter::new(Arc::clone(&store), provider, limits),
            extractor: IdentifierExtractor::new(limits),
            store,
            wait,
        }
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    pub fn provider_name(&self) -> &'static str {
        self.dispatcher.provider().name()
    }

    /// Dispatch `spec` and wait for its result
    ///
    /// `deadline` overrides the configured wait deadline for this call only.
    pub async fn generate(
        &self,
        spec: &GenerationSpec,
        deadline: Option<Duration>,
    ) -> Result<GenerationOutcome, DispatchError> {
        let receipt = self.dispatcher.dispatch(spec).await?;

        let mut wait = self.wait;
        if let Some(deadline) = deadline {
            wait.deadline = deadline;
        }

        let report = self.waiter.wait(&receipt, wait).await;
        Ok(GenerationOutcome { receipt, report })
    }

    /// Index an inbound callback under every identifier it carries
    ///
    /// A payload with no recognizable identifier is stored under a freshly
    /// minted `cb-<uuid>` key so it can still be listed and picked up by the
    /// waiters' post-deadline scan. Returns the keys written.
    pub async fn receive_callback(&self, payload: Value) -> Vec<String> {
        let mut keys: Vec<String> = self.extractor.extract(&payload).into_iter().collect();

        if keys.is_empty() {
            let synthetic = gcr_common::uuid_utils::prefixed(SYNTHETIC_KEY_PREFIX);
            warn!(key = %synthetic, "Callback carried no identifiers; storing under synthetic key");
            keys.push(synthetic);
        }

        let written = self.store.put_all(&keys, payload).await;
        info!(keys = ?keys, written, "Callback received");
        keys
    }

    /// Out-of-band lookup, typically after a timed-out wait
    pub async fn lookup(&self, token: &str) -> Option<MatchHit> {
        match_token(token, &self.store, self.extractor.limits()).await
    }

    pub async fn latest(&self) -> Option<(String, Arc<CallbackRecord>)> {
        self.store.latest().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::reference_lookup::StaticReferenceAsset;
    use crate::services::transport::TransportError;
    use crate::types::{CorrelationToken, GenerationKind, PollOutcome, ProviderToken};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn submit(
            &self,
            _spec: &GenerationSpec,
            token: &CorrelationToken,
        ) -> Result<Option<ProviderToken>, DispatchError> {
            Ok(Some(ProviderToken::new(format!("echo-{}", token))))
        }

        async fn poll_status(
            &self,
            _provider_token: &ProviderToken,
            _kind: GenerationKind,
        ) -> Result<PollOutcome, TransportError> {
            Ok(PollOutcome::Pending { status: None })
        }
    }

    fn service() -> GenerationService {
        GenerationService::new(
            Arc::new(CorrelationStore::new()),
            Arc::new(EchoProvider),
            Arc::new(StaticReferenceAsset::new("https://assets.test/ref.mp3")),
            WaitConfig {
                poll_interval: Duration::from_millis(20),
                deadline: Duration::from_millis(200),
            },
            PayloadLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_receive_callback_indexes_every_identifier() {
        let service = service();
        let keys = service
            .receive_callback(json!({"taskId": "t-1", "data": {"request_id": "r-9"}}))
            .await;
        assert_eq!(keys, vec!["r-9", "t-1"]);

        let a = service.store().get("t-1").await.unwrap();
        let b = service.store().get("r-9").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_receive_callback_synthetic_key() {
        let service = service();
        let keys = service.receive_callback(json!({"foo": "bar"})).await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("cb-"));

        let record = service.store().get(&keys[0]).await.unwrap();
        assert_eq!(record.payload, json!({"foo": "bar"}));
    }

    #[tokio::test]
    async fn test_generate_picks_up_callback_for_provider_token() {
        let service = Arc::new(service());
        let mut spec = GenerationSpec::new("synthwave");
        spec.correlation_token = Some(CorrelationToken::new("abc123"));

        let background = Arc::clone(&service);
        let deliver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            background
                .receive_callback(json!({"taskId": "echo-abc123", "audioUrl": "http://x/a.mp3"}))
                .await
        });

        let outcome = service.generate(&spec, None).await.unwrap();
        deliver.await.unwrap();
        assert_eq!(outcome.receipt.provider_token.as_str(), "echo-abc123");
        assert_eq!(outcome.report.outcome.label(), "completed_via_callback");
    }

    #[tokio::test]
    async fn test_lookup_and_latest() {
        let service = service();
        assert!(service.latest().await.is_none());

        service.receive_callback(json!({"taskId": "xyz-abc123-9"})).await;
        let hit = service.lookup("abc123").await.unwrap();
        assert_eq!(hit.key, "xyz-abc123-9");

        let (key, _) = service.latest().await.unwrap();
        assert_eq!(key, "xyz-abc123-9");
        assert!(service.lookup("nope").await.is_none());
    }
}
