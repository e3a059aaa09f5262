//! Reconciliation of the two delivery channels: races, duplicates, and
//! out-of-order arrivals.

use std::time::Duration;

use ccrv_orchestrator::{
    store::TransactionStore, CallbackDisposition, Error, ProviderResultPayload, QuotaState,
    TransactionStatus,
};
use tokio::task::JoinSet;

use crate::harness::{callback_json, TestHarness};

#[tokio::test]
async fn callback_arriving_before_store_write_is_parked_then_applied() {
    let harness = TestHarness::setup();

    // The provider finishes before our own persistence: callback first.
    let disposition = harness
        .orchestrator
        .ingest_callback(&callback_json("T1", "completed", Some(2)))
        .await
        .expect("callback");
    assert!(matches!(disposition, CallbackDisposition::Parked { .. }));
    assert_eq!(harness.orchestrator.parked_callbacks(), 1);

    // The store write lands shortly after.
    tokio::time::sleep(Duration::from_millis(30)).await;
    harness.initiate("ref-1", "T1").await.expect("initiate");

    // Within the retry window the parked callback is applied.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.result.expect("result").case_count, 2);
    assert_eq!(record.quota_state, QuotaState::Committed);
    assert_eq!(harness.ledger.committed_count(), 1);
    assert_eq!(harness.orchestrator.parked_callbacks(), 0);
}

#[tokio::test]
async fn parked_callback_expires_into_anomaly_when_record_never_appears() {
    let harness = TestHarness::setup();

    harness
        .orchestrator
        .ingest_callback(&callback_json("T-ghost", "completed", Some(1)))
        .await
        .expect("callback");
    assert_eq!(harness.orchestrator.parked_callbacks(), 1);

    // Let the retry window run out.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(harness.orchestrator.parked_callbacks(), 0);
    assert!(harness
        .orchestrator
        .anomalies()
        .iter()
        .any(|a| a.transaction_id == "T-ghost"));
}

#[tokio::test]
async fn terminal_state_absorbs_contradicting_callback() {
    let harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");

    harness
        .orchestrator
        .ingest_callback(&callback_json("T1", "completed", Some(3)))
        .await
        .expect("callback");

    // A late, contradicting FAILED report is discarded and logged.
    let disposition = harness
        .orchestrator
        .ingest_callback(&callback_json("T1", "failed", None))
        .await
        .expect("callback");
    assert!(matches!(
        disposition,
        CallbackDisposition::AlreadyFinal {
            status: TransactionStatus::Completed,
            ..
        }
    ));

    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.result.expect("result").case_count, 3);
    assert!(harness
        .orchestrator
        .anomalies()
        .iter()
        .any(|a| a.transaction_id == "T1"));
}

#[tokio::test]
async fn duplicate_callback_delivery_is_idempotent() {
    let mut harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");

    let payload = callback_json("T1", "completed", Some(1));
    harness
        .orchestrator
        .ingest_callback(&payload)
        .await
        .expect("first delivery");
    let disposition = harness
        .orchestrator
        .ingest_callback(&payload)
        .await
        .expect("second delivery");
    assert!(matches!(
        disposition,
        CallbackDisposition::AlreadyFinal { .. }
    ));

    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.quota_state, QuotaState::Committed);
    assert_eq!(harness.ledger.committed_count(), 1);

    // No duplicate notification either.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.drain_finalized_events(), 1);
    // The duplicate agreed with the stored state, so no anomaly.
    assert!(harness.orchestrator.anomalies().is_empty());
}

#[tokio::test]
async fn concurrent_polls_and_callback_commit_quota_once() {
    let mut harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");

    // Every concurrent observer sees "completed" from the provider.
    harness.gateway.script_fetch(
        "T1",
        ProviderResultPayload::Completed(ccrv_orchestrator::VerificationResult {
            case_count: 4,
            cases: Vec::new(),
            report_url: None,
        }),
    );

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let orchestrator = harness.orchestrator.clone();
        tasks.spawn(async move { orchestrator.poll("T1").await.map(|r| r.status) });
    }
    let orchestrator = harness.orchestrator.clone();
    let payload = callback_json("T1", "completed", Some(4));
    tasks.spawn(async move {
        orchestrator
            .ingest_callback(&payload)
            .await
            .map(|_| TransactionStatus::Completed)
    });

    while let Some(joined) = tasks.join_next().await {
        let status = joined.expect("task").expect("operation");
        assert_eq!(status, TransactionStatus::Completed);
    }

    // However the interleaving played out: one commit, one settlement,
    // one notification.
    assert_eq!(harness.ledger.committed_count(), 1);
    assert_eq!(harness.store.stats().quota_settlements, 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.drain_finalized_events(), 1);

    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.result.expect("result").case_count, 4);
}

#[tokio::test]
async fn malformed_callback_body_is_acknowledged_but_recorded() {
    let harness = TestHarness::setup();
    harness.initiate("ref-1", "T1").await.expect("initiate");

    // Well-formed envelope, unknown status word: acknowledged (Ok) but
    // queued for manual review.
    let disposition = harness
        .orchestrator
        .ingest_callback(&callback_json("T1", "exploded", None))
        .await
        .expect("disposition");
    assert!(matches!(disposition, CallbackDisposition::Rejected { .. }));
    assert!(!harness.orchestrator.anomalies().is_empty());

    // The record is untouched and still pollable.
    let record = harness.store.get("T1").expect("get").expect("record");
    assert_eq!(record.status, TransactionStatus::Requested);
}

#[tokio::test]
async fn outright_malformed_envelope_is_an_error() {
    let harness = TestHarness::setup();
    let err = harness
        .orchestrator
        .ingest_callback("this is not json")
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::CallbackUnrecognized(_)));
}
