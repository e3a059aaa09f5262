//! Test harness wiring the orchestrator to scripted collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ccrv_orchestrator::config::{CallbackRetryConfig, StoreRetryConfig};
use ccrv_orchestrator::event::VerificationEventsChannel;
use ccrv_orchestrator::notify::BroadcastSink;
use ccrv_orchestrator::provider::{ProviderAck, SearchRequest};
use ccrv_orchestrator::quota::InMemoryQuotaLedger;
use ccrv_orchestrator::store::InMemoryTransactionStore;
use ccrv_orchestrator::{
    create_event_channel, Consent, Error, InitiateReceipt, Orchestrator, ProviderGateway,
    ProviderResultPayload, Result, SubjectIdentity,
};
use parking_lot::Mutex;

/// Scripted provider double.
///
/// `submit` pops queued acknowledgments; `fetch_result` serves per-id
/// payload scripts, keeping the last payload sticky so any number of
/// concurrent polls observe the same provider state.
pub struct MockProviderGateway {
    submit_script: Mutex<VecDeque<Result<ProviderAck>>>,
    submit_calls: AtomicUsize,
    fetch_script: Mutex<HashMap<String, VecDeque<ProviderResultPayload>>>,
    fetch_calls: AtomicUsize,
}

impl MockProviderGateway {
    pub fn new() -> Self {
        Self {
            submit_script: Mutex::new(VecDeque::new()),
            submit_calls: AtomicUsize::new(0),
            fetch_script: Mutex::new(HashMap::new()),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_submit_ok(&self, transaction_id: &str) {
        self.submit_script.lock().push_back(Ok(ProviderAck {
            transaction_id: transaction_id.to_string(),
            ccrv_status: Some("REQUESTED".to_string()),
        }));
    }

    pub fn script_submit_err(&self, error: Error) {
        self.submit_script.lock().push_back(Err(error));
    }

    /// Queue a payload for a transaction id. The last queued payload stays
    /// sticky and is served to every subsequent fetch.
    pub fn script_fetch(&self, transaction_id: &str, payload: ProviderResultPayload) {
        self.fetch_script
            .lock()
            .entry(transaction_id.to_string())
            .or_default()
            .push_back(payload);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderGateway for MockProviderGateway {
    async fn submit(&self, _request: &SearchRequest) -> Result<ProviderAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ProviderUnavailable("unscripted submit".to_string())))
    }

    async fn fetch_result(&self, transaction_id: &str) -> Result<ProviderResultPayload> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.fetch_script.lock();
        let queue = scripts
            .get_mut(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        match queue.len() {
            0 => Err(Error::TransactionNotFound(transaction_id.to_string())),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().unwrap_or(ProviderResultPayload::InProgress)),
        }
    }
}

/// Everything a scenario needs: the orchestrator plus handles to all of its
/// collaborators for scripting and assertions.
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub gateway: Arc<MockProviderGateway>,
    pub store: Arc<InMemoryTransactionStore>,
    pub ledger: Arc<InMemoryQuotaLedger>,
    pub events: VerificationEventsChannel,
}

impl TestHarness {
    /// Harness with a comfortable credit pool and fast retry settings.
    pub fn setup() -> Self {
        Self::with_credits(8)
    }

    pub fn with_credits(credits: u64) -> Self {
        let gateway = Arc::new(MockProviderGateway::new());
        let store = Arc::new(InMemoryTransactionStore::new());
        let ledger = Arc::new(InMemoryQuotaLedger::with_credits(credits));
        let (events_tx, events) = create_event_channel();
        let sink = Arc::new(BroadcastSink::new(events_tx));

        // Short backoffs so parked-callback windows resolve quickly.
        let callback_retry = CallbackRetryConfig {
            max_attempts: 6,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
        };
        let store_retry = StoreRetryConfig {
            max_attempts: 3,
            backoff_ms: 5,
        };

        let orchestrator = Orchestrator::with_retry(
            Arc::clone(&gateway) as Arc<dyn ProviderGateway>,
            Arc::clone(&store) as Arc<dyn ccrv_orchestrator::store::TransactionStore>,
            Arc::clone(&ledger) as Arc<dyn ccrv_orchestrator::quota::QuotaLedger>,
            sink,
            callback_retry,
            store_retry,
        );

        Self {
            orchestrator,
            gateway,
            store,
            ledger,
            events,
        }
    }

    pub fn identity() -> SubjectIdentity {
        SubjectIdentity {
            name: "A B".to_string(),
            address: "X".to_string(),
            father_name: None,
            date_of_birth: None,
        }
    }

    /// Script a submit ack for `transaction_id` and initiate with it.
    pub async fn initiate(
        &self,
        reference: &str,
        transaction_id: &str,
    ) -> Result<InitiateReceipt> {
        self.gateway.script_submit_ok(transaction_id);
        self.orchestrator
            .initiate(reference, &Self::identity(), Consent::Granted)
            .await
    }

    /// Drain currently-buffered events, returning how many were
    /// finalizations.
    pub fn drain_finalized_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            if matches!(
                event,
                ccrv_orchestrator::VerificationEvent::Finalized { .. }
            ) {
                count += 1;
            }
        }
        count
    }
}

/// Raw callback JSON the way the provider posts it.
pub fn callback_json(transaction_id: &str, status: &str, case_count: Option<u32>) -> String {
    let data = match case_count {
        Some(count) => serde_json::json!({
            "code": 200,
            "ccrv_status": status,
            "ccrv_data": {
                "case_count": count,
                "cases": [],
                "report_url": "https://provider.example/report.pdf"
            }
        }),
        None => serde_json::json!({
            "code": 200,
            "ccrv_status": status,
            "message": "as reported by provider"
        }),
    };
    serde_json::json!({
        "transactionId": transaction_id,
        "referenceId": "ref-echo",
        "authType": "hmac",
        "payload": { "data": data }
    })
    .to_string()
}
