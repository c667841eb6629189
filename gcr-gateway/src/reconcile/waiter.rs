//! Reconciliation waiter
//!
//! After dispatch, a waiter races two evidence sources for the same request:
//! callbacks landing in the [`CorrelationStore`] and the provider's status
//! endpoint. Each iteration:
//!
//! 1. Match the correlation token, then the provider token, against the store
//!    (the first probe runs before any sleep, so a callback that beat the
//!    waiter is found immediately)
//! 2. Poll the provider once; terminal success or failure ends the wait
//! 3. Anything else, including transport errors, keeps the request pending
//! 4. Sleep until the next interval or the deadline, whichever is sooner
//!
//! Once the deadline passes, one last scan picks up the newest record stored
//! since the wait began; otherwise the request times out. A timeout is not a
//! failure: the token stays valid for out-of-band lookup.
//!
//! No store lock is held across a sleep or a provider call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use super::dispatcher::DispatchReceipt;
use super::matcher::{match_token, MatchTier};
use super::payload::PayloadLimits;
use super::store::{CallbackRecord, CorrelationStore};
use crate::types::{CorrelationToken, GenerationKind, PollOutcome, Provider, ProviderToken};

/// Stand-in for deadlines too far out to represent (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Timing inputs for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed,
    TimedOut,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Pending
    }
}

/// Per-wait bookkeeping; lives only as long as the wait call
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub correlation_token: CorrelationToken,
    pub provider_token: Option<ProviderToken>,
    pub kind: GenerationKind,
    pub dispatched_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    status: RequestStatus,
}

impl GenerationRequest {
    /// `deadline` saturates at the latest representable timestamp
    pub fn new(receipt: &DispatchReceipt, started_at: DateTime<Utc>, wait: Duration) -> Self {
        let deadline = chrono::Duration::from_std(wait)
            .ok()
            .and_then(|wait| started_at.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            correlation_token: receipt.correlation_token.clone(),
            provider_token: Some(receipt.provider_token.clone()),
            kind: receipt.kind,
            dispatched_at: receipt.dispatched_at,
            deadline,
            status: RequestStatus::Pending,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Move from pending to `status`
    ///
    /// Terminal states are absorbing; returns false (and changes nothing)
    /// when the request was already settled.
    pub fn settle(&mut self, status: RequestStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

/// Terminal result of a wait
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    CompletedViaCallback {
        /// Store key the record was found under
        key: String,
        record: Arc<CallbackRecord>,
        /// Matching rule; `None` when found by the post-deadline scan
        tier: Option<MatchTier>,
    },
    CompletedViaPoll {
        result: String,
        assets: BTreeMap<String, String>,
        raw: Value,
    },
    Failed {
        message: String,
    },
    TimedOut {
        correlation_token: CorrelationToken,
    },
}

impl WaitOutcome {
    fn status(&self) -> RequestStatus {
        match self {
            WaitOutcome::CompletedViaCallback { .. } | WaitOutcome::CompletedViaPoll { .. } => {
                RequestStatus::Completed
            }
            WaitOutcome::Failed { .. } => RequestStatus::Failed,
            WaitOutcome::TimedOut { .. } => RequestStatus::TimedOut,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WaitOutcome::CompletedViaCallback { .. } => "completed_via_callback",
            WaitOutcome::CompletedViaPoll { .. } => "completed_via_poll",
            WaitOutcome::Failed { .. } => "failed",
            WaitOutcome::TimedOut { .. } => "timed_out",
        }
    }
}

/// What a wait call hands back to its caller
#[derive(Debug, Clone)]
pub struct WaitReport {
    pub request: GenerationRequest,
    pub outcome: WaitOutcome,
    /// Status checks issued (including ones that errored)
    pub polls: u32,
    pub elapsed: Duration,
}

/// Runs the reconciliation loop for dispatched requests
#[derive(Clone)]
pub struct ReconciliationWaiter {
    store: Arc<CorrelationStore>,
    provider: Arc<dyn Provider>,
    limits: PayloadLimits,
}

impl ReconciliationWaiter {
    pub fn new(store: Arc<CorrelationStore>, provider: Arc<dyn Provider>, limits: PayloadLimits) -> Self {
        Self {
            store,
            provider,
            limits,
        }
    }

    pub async fn wait(&self, receipt: &DispatchReceipt, config: WaitConfig) -> WaitReport {
        let started = Instant::now();
        let started_at = gcr_common::time::now();
        let deadline = started
            .checked_add(config.deadline)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut request = GenerationRequest::new(receipt, started_at, config.deadline);
        let mut polls = 0u32;

        debug!(
            token = %request.correlation_token,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            deadline_ms = config.deadline.as_millis() as u64,
            "Waiting for generation result"
        );

        let outcome = loop {
            if let Some(outcome) = self.probe_store(&request).await {
                break outcome;
            }

            let now = Instant::now();
            if now >= deadline {
                break self.after_deadline(&request, started_at).await;
            }

            if let Some(provider_token) = &request.provider_token {
                polls += 1;
                let poll = self.provider.poll_status(provider_token, request.kind);
                match timeout(deadline - now, poll).await {
                    Ok(Ok(PollOutcome::Completed { result, assets, raw })) => {
                        break WaitOutcome::CompletedViaPoll { result, assets, raw };
                    }
                    Ok(Ok(PollOutcome::Failed { message })) => {
                        break WaitOutcome::Failed { message };
                    }
                    Ok(Ok(PollOutcome::Pending { status })) => {
                        debug!(token = %request.correlation_token, poll = polls, status = ?status, "Still pending");
                    }
                    Ok(Err(e)) => {
                        warn!(token = %request.correlation_token, poll = polls, error = %e, "Status check failed; continuing");
                    }
                    Err(_) => {
                        debug!(token = %request.correlation_token, poll = polls, "Status check cut off by deadline");
                    }
                }
            }

            let next = Instant::now()
                .checked_add(config.poll_interval)
                .map_or(deadline, |next| next.min(deadline));
            sleep_until(next).await;
        };

        request.settle(outcome.status());
        let elapsed = started.elapsed();
        info!(
            token = %request.correlation_token,
            outcome = outcome.label(),
            polls,
            elapsed_ms = elapsed.as_millis() as u64,
            "Reconciliation finished"
        );

        WaitReport {
            request,
            outcome,
            polls,
            elapsed,
        }
    }

    /// Match either token; the correlation token is tried first
    async fn probe_store(&self, request: &GenerationRequest) -> Option<WaitOutcome> {
        let tokens = std::iter::once(request.correlation_token.as_str())
            .chain(request.provider_token.as_ref().map(ProviderToken::as_str));

        for token in tokens {
            if let Some(hit) = match_token(token, &self.store, &self.limits).await {
                debug!(token, key = %hit.key, tier = ?hit.tier, "Callback matched");
                return Some(WaitOutcome::CompletedViaCallback {
                    key: hit.key,
                    record: hit.record,
                    tier: Some(hit.tier),
                });
            }
        }
        None
    }

    /// Best-effort pickup of anything stored during the wait
    ///
    /// The newest record received after `started_at` is taken even if it
    /// cannot be tied to this request; with several concurrent waiters it
    /// may belong to another one.
    async fn after_deadline(&self, request: &GenerationRequest, started_at: DateTime<Utc>) -> WaitOutcome {
        match self.store.latest_since(started_at).await {
            Some((key, record)) => {
                warn!(
                    token = %request.correlation_token,
                    key = %key,
                    "Deadline reached; taking most recent unmatched callback"
                );
                WaitOutcome::CompletedViaCallback {
                    key,
                    record,
                    tier: None,
                }
            }
            None => WaitOutcome::TimedOut {
                correlation_token: request.correlation_token.clone(),
            },
        }
    }
}
