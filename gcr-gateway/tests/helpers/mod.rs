//! Shared fixtures for gcr-gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gcr_gateway::reconcile::{CorrelationStore, DispatchError, PayloadLimits, WaitConfig};
use gcr_gateway::services::transport::TransportError;
use gcr_gateway::services::{GenerationService, StaticReferenceAsset};
use gcr_gateway::types::{
    CorrelationToken, GenerationKind, GenerationSpec, PollOutcome, Provider, ProviderToken,
};
use gcr_gateway::AppState;

pub const REFERENCE_URL: &str = "https://assets.test/reference.mp3";

/// In-process provider with scripted answers
///
/// `submit` answers with `provider_token` (or `submit_error`); each
/// `poll_status` pops the next scripted answer and repeats the last one
/// once the script runs out.
pub struct FakeProvider {
    provider_token: Option<String>,
    submit_error: Mutex<Option<DispatchError>>,
    polls: Mutex<VecDeque<Result<PollOutcome, TransportError>>>,
    last_poll: Mutex<Option<PollOutcome>>,
    pub submit_calls: AtomicU32,
    pub poll_calls: AtomicU32,
    pub submitted: Mutex<Vec<(GenerationSpec, CorrelationToken)>>,
}

impl FakeProvider {
    pub fn new(provider_token: &str) -> Self {
        Self {
            provider_token: Some(provider_token.to_string()),
            submit_error: Mutex::new(None),
            polls: Mutex::new(VecDeque::new()),
            last_poll: Mutex::new(None),
            submit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Provider that accepts requests but never returns a token
    pub fn tokenless() -> Self {
        Self {
            provider_token: None,
            ..Self::new("")
        }
    }

    pub fn failing_submit(self, error: DispatchError) -> Self {
        *self.submit_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_polls(self, polls: Vec<Result<PollOutcome, TransportError>>) -> Self {
        *self.polls.lock().unwrap() = polls.into();
        self
    }

    pub fn polls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

pub fn pending() -> Result<PollOutcome, TransportError> {
    Ok(PollOutcome::Pending {
        status: Some("PENDING".to_string()),
    })
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(
        &self,
        spec: &GenerationSpec,
        token: &CorrelationToken,
    ) -> Result<Option<ProviderToken>, DispatchError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap()
            .push((spec.clone(), token.clone()));

        if let Some(error) = self.submit_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.provider_token.clone().map(ProviderToken::new))
    }

    async fn poll_status(
        &self,
        _provider_token: &ProviderToken,
        _kind: GenerationKind,
    ) -> Result<PollOutcome, TransportError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(Ok(outcome)) => {
                *self.last_poll.lock().unwrap() = Some(outcome.clone());
                Ok(outcome)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self
                .last_poll
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(PollOutcome::Pending { status: None })),
        }
    }
}

pub fn wait_config(poll_interval: Duration, deadline: Duration) -> WaitConfig {
    WaitConfig {
        poll_interval,
        deadline,
    }
}

pub fn service(provider: Arc<FakeProvider>, wait: WaitConfig) -> Arc<GenerationService> {
    Arc::new(GenerationService::new(
        Arc::new(CorrelationStore::new()),
        provider,
        Arc::new(StaticReferenceAsset::new(REFERENCE_URL)),
        wait,
        PayloadLimits::default(),
    ))
}

/// Longest `timeout_seconds` the test router accepts
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);

pub fn app_state(provider: Arc<FakeProvider>, sync_deadline: Duration) -> AppState {
    let wait = wait_config(Duration::from_millis(20), sync_deadline);
    AppState::new(service(provider, wait), sync_deadline, MAX_TIMEOUT)
}

/// Serve `router` on an ephemeral local port; returns its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
