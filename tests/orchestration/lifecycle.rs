//! Happy-path and caller-facing lifecycle scenarios.

use ccrv_orchestrator::{
    store::TransactionStore, CallbackDisposition, Consent, Error, ProviderResultPayload, QuotaState,
    TransactionStatus,
};

use crate::harness::{callback_json, TestHarness};

#[tokio::test]
async fn full_lifecycle_poll_then_callback() {
    let mut harness = TestHarness::setup();

    // Initiate: stored as REQUESTED, nothing billed yet.
    let receipt = harness.initiate("ref-1", "T100").await.expect("initiate");
    assert_eq!(receipt.transaction_id, "T100");
    assert_eq!(receipt.status, TransactionStatus::Requested);

    // Poll while the provider is still searching.
    harness
        .gateway
        .script_fetch("T100", ProviderResultPayload::InProgress);
    let record = harness.orchestrator.poll("T100").await.expect("poll");
    assert_eq!(record.status, TransactionStatus::InProgress);
    assert_eq!(record.quota_state, QuotaState::Uncommitted);
    assert_eq!(harness.ledger.committed_count(), 0);

    // The provider pushes completion with three cases.
    let disposition = harness
        .orchestrator
        .ingest_callback(&callback_json("T100", "completed", Some(3)))
        .await
        .expect("callback");
    assert!(matches!(
        disposition,
        CallbackDisposition::Applied {
            status: TransactionStatus::Completed,
            ..
        }
    ));

    let record = harness.store.get("T100").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Completed);
    let result = record.result.expect("result");
    assert_eq!(result.case_count, 3);
    assert_eq!(record.quota_state, QuotaState::Committed);
    assert_eq!(harness.ledger.committed_count(), 1);

    // A later poll serves the cached result without touching the provider.
    let fetches_before = harness.gateway.fetch_calls();
    let record = harness.orchestrator.poll("T100").await.expect("poll");
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(harness.gateway.fetch_calls(), fetches_before);

    // Exactly one finalization notification went out.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(harness.drain_finalized_events(), 1);
}

#[tokio::test]
async fn idempotent_polling_after_terminal_state() {
    let harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");
    harness
        .gateway
        .script_fetch("T1", ProviderResultPayload::Failed {
            reason: "source offline".to_string(),
        });

    let first = harness.orchestrator.poll("T1").await.expect("poll");
    assert_eq!(first.status, TransactionStatus::Failed);
    let fetches = harness.gateway.fetch_calls();

    for _ in 0..5 {
        let again = harness.orchestrator.poll("T1").await.expect("poll");
        assert_eq!(again.status, first.status);
        assert_eq!(again.finalized_at, first.finalized_at);
    }
    // Zero additional provider calls after the first terminal observation.
    assert_eq!(harness.gateway.fetch_calls(), fetches);
}

#[tokio::test]
async fn poll_with_unknown_transaction_id() {
    let harness = TestHarness::setup();
    let err = harness
        .orchestrator
        .poll("no-such-id")
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::TransactionNotFound(_)));
}

#[tokio::test]
async fn initiate_with_quota_denied_makes_no_provider_call() {
    let harness = TestHarness::with_credits(0);
    let err = harness
        .orchestrator
        .initiate("ref-1", &TestHarness::identity(), Consent::Granted)
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::QuotaExceeded(_)));
    assert_eq!(harness.gateway.submit_calls(), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn failed_submit_releases_reservation_for_retry() {
    let harness = TestHarness::with_credits(1);
    harness
        .gateway
        .script_submit_err(Error::ProviderUnavailable("gateway down".to_string()));

    let err = harness
        .orchestrator
        .initiate("ref-1", &TestHarness::identity(), Consent::Granted)
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::ProviderUnavailable(_)));

    // The credit is back; a retry succeeds.
    let receipt = harness.initiate("ref-1", "T2").await.expect("retry");
    assert_eq!(receipt.transaction_id, "T2");
}

#[tokio::test]
async fn minor_subject_releases_quota() {
    let harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");
    let available_before = harness.ledger.available();

    harness
        .orchestrator
        .ingest_callback(&callback_json("T1", "minor", None))
        .await
        .expect("callback");

    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Minor);
    assert_eq!(record.quota_state, QuotaState::Released);
    assert!(record.result.is_none());
    // The reservation came back to the pool.
    assert_eq!(harness.ledger.available(), available_before + 1);
    assert_eq!(harness.ledger.committed_count(), 0);
}

#[tokio::test]
async fn provider_losing_a_known_id_degrades_and_records_anomaly() {
    let harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");

    // No fetch script for T1: the mock answers "not found".
    let record = harness.orchestrator.poll("T1").await.expect("poll");
    assert_eq!(record.status, TransactionStatus::Requested);
    assert!(!harness.orchestrator.anomalies().is_empty());
}
