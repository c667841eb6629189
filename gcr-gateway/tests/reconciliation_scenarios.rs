//! End-to-end reconciliation scenarios
//!
//! Dispatch → wait → terminal outcome through `GenerationService`, with an
//! in-process provider and callbacks delivered concurrently.

mod helpers;

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcr_gateway::reconcile::{DispatchError, MatchTier, RequestStatus, WaitOutcome};
use gcr_gateway::services::transport::TransportError;
use gcr_gateway::types::{CorrelationToken, GenerationSpec, PollOutcome};
use helpers::{pending, service, wait_config, FakeProvider};

fn spec_with_token(token: &str) -> GenerationSpec {
    let mut spec = GenerationSpec::new("warm analog synth ballad");
    spec.correlation_token = Some(CorrelationToken::new(token));
    spec
}

#[tokio::test]
async fn test_never_matching_wait_times_out_between_3_and_4_seconds() {
    let provider = Arc::new(FakeProvider::new("p-never"));
    let service = service(
        provider.clone(),
        wait_config(Duration::from_secs(1), Duration::from_secs(3)),
    );

    let started = Instant::now();
    let outcome = service.generate(&spec_with_token("tok-slow"), None).await.unwrap();
    let elapsed = started.elapsed();

    match &outcome.report.outcome {
        WaitOutcome::TimedOut { correlation_token } => assert_eq!(correlation_token.as_str(), "tok-slow"),
        other => panic!("expected TimedOut, got {:?}", other),
    }
    assert_eq!(outcome.report.request.status(), RequestStatus::TimedOut);
    assert!(elapsed >= Duration::from_secs(3), "returned early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(4_500), "returned late: {:?}", elapsed);
    assert!(provider.polls() >= 3);
}

#[tokio::test]
async fn test_callback_for_wrapped_provider_token_matches_by_substring() {
    let provider = Arc::new(FakeProvider::new("xyz-abc123-9"));
    let service = service(
        provider,
        wait_config(Duration::from_secs(1), Duration::from_secs(10)),
    );

    let background = Arc::clone(&service);
    let delivery = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        background
            .receive_callback(json!({
                "taskId": "xyz-abc123-9",
                "data": {"callbackType": "complete", "audioUrl": "http://x/a.mp3"}
            }))
            .await
    });

    let started = Instant::now();
    let outcome = service.generate(&spec_with_token("abc123"), None).await.unwrap();
    let stored_under = delivery.await.unwrap();

    assert_eq!(stored_under, vec!["xyz-abc123-9"]);
    match &outcome.report.outcome {
        WaitOutcome::CompletedViaCallback { key, tier, record } => {
            assert_eq!(key, "xyz-abc123-9");
            assert_eq!(*tier, Some(MatchTier::Substring));
            assert_eq!(record.payload["data"]["audioUrl"], "http://x/a.mp3");
        }
        other => panic!("expected CompletedViaCallback, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_success_on_third_poll_completes_via_poll() {
    let provider = Arc::new(FakeProvider::new("p-3").with_polls(vec![
        pending(),
        pending(),
        Ok(PollOutcome::Completed {
            result: "http://x/a.mp3".to_string(),
            assets: BTreeMap::new(),
            raw: json!({"status": "success", "audioUrl": "http://x/a.mp3"}),
        }),
    ]));
    let service = service(
        provider.clone(),
        wait_config(Duration::from_millis(100), Duration::from_secs(10)),
    );

    let outcome = service.generate(&spec_with_token("tok-poll"), None).await.unwrap();

    match &outcome.report.outcome {
        WaitOutcome::CompletedViaPoll { result, raw, .. } => {
            assert_eq!(result, "http://x/a.mp3");
            assert_eq!(raw["status"], "success");
        }
        other => panic!("expected CompletedViaPoll, got {:?}", other),
    }
    assert_eq!(provider.polls(), 3);
    assert_eq!(outcome.report.request.status(), RequestStatus::Completed);
}

#[tokio::test]
async fn test_provider_failure_returns_immediately() {
    let provider = Arc::new(FakeProvider::new("p-f").with_polls(vec![Ok(PollOutcome::Failed {
        message: "quota exceeded".to_string(),
    })]));
    let service = service(
        provider,
        wait_config(Duration::from_secs(1), Duration::from_secs(30)),
    );

    let started = Instant::now();
    let outcome = service.generate(&spec_with_token("tok-fail"), None).await.unwrap();

    match &outcome.report.outcome {
        WaitOutcome::Failed { message } => assert_eq!(message, "quota exceeded"),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.report.request.status(), RequestStatus::Failed);
}

#[tokio::test]
async fn test_transport_errors_while_polling_do_not_end_the_wait() {
    let provider = Arc::new(FakeProvider::new("p-flaky").with_polls(vec![
        Err(TransportError::ServiceUnavailable { attempts: 3 }),
        Err(TransportError::Network("connection reset".to_string())),
        Ok(PollOutcome::Completed {
            result: "http://x/b.mp3".to_string(),
            assets: BTreeMap::new(),
            raw: json!({}),
        }),
    ]));
    let service = service(
        provider.clone(),
        wait_config(Duration::from_millis(50), Duration::from_secs(5)),
    );

    let outcome = service.generate(&spec_with_token("tok-flaky"), None).await.unwrap();
    assert_eq!(outcome.report.outcome.label(), "completed_via_poll");
    assert_eq!(provider.polls(), 3);
}

#[tokio::test]
async fn test_callback_before_wait_starts_is_found_without_polling() {
    let provider = Arc::new(FakeProvider::new("p-early"));
    let service = service(
        provider.clone(),
        wait_config(Duration::from_secs(1), Duration::from_secs(5)),
    );

    service
        .receive_callback(json!({"data": {"task_id": "tok-early"}}))
        .await;

    let outcome = service.generate(&spec_with_token("tok-early"), None).await.unwrap();
    assert!(matches!(
        outcome.report.outcome,
        WaitOutcome::CompletedViaCallback { tier: Some(MatchTier::ExactKey), .. }
    ));
    assert_eq!(provider.polls(), 0);
}

#[tokio::test]
async fn test_title_marker_callback_matches_full_token() {
    let provider = Arc::new(FakeProvider::new("provider-internal-77"));
    let service = service(
        provider,
        wait_config(Duration::from_millis(50), Duration::from_secs(5)),
    );

    let token = "3f2a9c1e-77aa-4d1b-9d2e-0c0ffee00000";
    let background = Arc::clone(&service);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        background
            .receive_callback(json!({"data": [{"title": "Generated Music 3f2a9c1e", "audioUrl": "u"}]}))
            .await;
    });

    let outcome = service.generate(&spec_with_token(token), None).await.unwrap();
    match &outcome.report.outcome {
        WaitOutcome::CompletedViaCallback { key, tier, .. } => {
            assert_eq!(key, "3f2a9c1e");
            assert_eq!(*tier, Some(MatchTier::Substring));
        }
        other => panic!("expected CompletedViaCallback, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identifierless_callback_gets_synthetic_key() {
    let service = service(
        Arc::new(FakeProvider::new("p")),
        wait_config(Duration::from_secs(1), Duration::from_secs(1)),
    );

    let keys = service.receive_callback(json!({"foo": "bar"})).await;
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("cb-"));

    let record = service.store().get(&keys[0]).await.unwrap();
    assert_eq!(record.payload, json!({"foo": "bar"}));
}

#[tokio::test]
async fn test_timed_out_result_retrievable_out_of_band() {
    let service = service(
        Arc::new(FakeProvider::new("p-late")),
        wait_config(Duration::from_millis(50), Duration::from_millis(200)),
    );

    let outcome = service.generate(&spec_with_token("tok-late"), None).await.unwrap();
    assert_eq!(outcome.report.outcome.label(), "timed_out");
    assert!(service.lookup("tok-late").await.is_none());

    service
        .receive_callback(json!({"taskId": "tok-late", "audioUrl": "http://x/late.mp3"}))
        .await;
    let hit = service.lookup("tok-late").await.unwrap();
    assert_eq!(hit.tier, MatchTier::ExactKey);
    assert_eq!(hit.record.payload["audioUrl"], "http://x/late.mp3");
}

#[tokio::test]
async fn test_dispatch_errors_surface_without_waiting() {
    let service = service(
        Arc::new(FakeProvider::tokenless()),
        wait_config(Duration::from_secs(1), Duration::from_secs(30)),
    );
    let result = service.generate(&spec_with_token("t"), None).await;
    assert!(matches!(result, Err(DispatchError::MissingProviderToken)));

    let service = helpers::service(
        Arc::new(
            FakeProvider::new("p").failing_submit(DispatchError::Rejected("insufficient credits".into())),
        ),
        wait_config(Duration::from_secs(1), Duration::from_secs(30)),
    );
    let result = service.generate(&spec_with_token("t"), None).await;
    assert!(matches!(result, Err(DispatchError::Rejected(ref m)) if m == "insufficient credits"));
}

#[tokio::test]
async fn test_concurrent_waiters_each_get_their_own_callback() {
    let service = service(
        Arc::new(FakeProvider::new("shared-provider-token")),
        wait_config(Duration::from_millis(50), Duration::from_secs(5)),
    );

    let mut waits = Vec::new();
    for i in 0..5 {
        let service = Arc::clone(&service);
        waits.push(tokio::spawn(async move {
            service
                .generate(&spec_with_token(&format!("job-{i}")), None)
                .await
                .unwrap()
        }));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    for i in 0..5 {
        service
            .receive_callback(json!({"job_id": format!("job-{i}"), "n": i}))
            .await;
    }

    for (i, wait) in waits.into_iter().enumerate() {
        let outcome = wait.await.unwrap();
        match outcome.report.outcome {
            WaitOutcome::CompletedViaCallback { record, .. } => assert_eq!(record.payload["n"], i),
            other => panic!("waiter {} got {:?}", i, other),
        }
    }
}
