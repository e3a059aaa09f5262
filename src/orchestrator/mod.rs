//! Verification transaction orchestrator.
//!
//! Owns the transaction state machine. `poll` and `ingest_callback` are two
//! unordered, possibly-duplicated delivery channels for the same provider
//! events; both feed [`Orchestrator::apply_observation`], the single place
//! that encodes the transitions. Correctness under every interleaving rests
//! on the store's per-record compare-and-swap writes:
//!
//! - terminal states are absorbing — the first terminal observation wins;
//! - quota settles through a dedicated `Uncommitted -> Committed|Released`
//!   swap, so the ledger is called exactly once per transaction;
//! - the notification for a finalized transaction is published only by the
//!   writer that won that swap.

mod parked;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{CallbackRetryConfig, StoreRetryConfig};
use crate::error::{Error, Result};
use crate::event::VerificationEvent;
use crate::notify::NotificationSink;
use crate::provider::{CallbackEnvelope, ProviderGateway, ProviderResultPayload, SearchRequest};
use crate::quota::QuotaLedger;
use crate::store::{CasOutcome, StatusUpdate, TransactionStore};
use crate::transaction::{
    Consent, QuotaState, SubjectIdentity, TransactionStatus, UpdateSource,
    VerificationTransaction,
};

use self::parked::ParkedCallbacks;

/// Bound on compare-and-swap retries within one observation. Conflicts mean
/// another writer is advancing the same record, so the record converges in
/// at most a couple of rounds.
const CAS_ATTEMPTS: u32 = 4;

/// Capacity of the anomaly review queue; oldest entries are dropped first.
const ANOMALY_CAPACITY: usize = 1_024;

/// Receipt returned to the caller by [`Orchestrator::initiate`].
#[derive(Debug, Clone)]
pub struct InitiateReceipt {
    /// Provider-issued transaction id to poll with.
    pub transaction_id: String,
    /// Status at initiation.
    pub status: TransactionStatus,
}

/// How an inbound callback was handled.
///
/// Every variant except a parse failure of the outer envelope is
/// acknowledged to the provider; an HTTP boundary maps `Err` to 4xx and
/// `Ok(_)` to 200 to avoid provider-side retry storms.
#[derive(Debug, Clone)]
pub enum CallbackDisposition {
    /// The observation advanced the transaction.
    Applied {
        /// Transaction the callback referred to.
        transaction_id: String,
        /// Status after applying the observation.
        status: TransactionStatus,
    },
    /// The transaction was already terminal; the observation was discarded.
    AlreadyFinal {
        /// Transaction the callback referred to.
        transaction_id: String,
        /// The (unchanged) terminal status.
        status: TransactionStatus,
    },
    /// No record exists yet; the payload was parked for bounded retry.
    Parked {
        /// Transaction the callback referred to.
        transaction_id: String,
    },
    /// The payload body could not be normalized; recorded as an anomaly.
    Rejected {
        /// Transaction the callback referred to.
        transaction_id: String,
        /// Why normalization failed.
        reason: String,
    },
}

/// A discarded or unprocessable observation, kept for manual review.
#[derive(Debug, Clone)]
pub struct Anomaly {
    /// Transaction id the anomaly refers to.
    pub transaction_id: String,
    /// What went wrong.
    pub detail: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// The verification transaction orchestrator.
///
/// Cheap to clone; all collaborators are shared. Every operation takes
/// `&self` and may run concurrently with any other.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: Arc<dyn ProviderGateway>,
    store: Arc<dyn TransactionStore>,
    quota: Arc<dyn QuotaLedger>,
    sink: Arc<dyn NotificationSink>,
    callback_retry: CallbackRetryConfig,
    store_retry: StoreRetryConfig,
    parked: ParkedCallbacks,
    anomalies: Arc<Mutex<Vec<Anomaly>>>,
}

impl Orchestrator {
    /// Create an orchestrator with default retry settings.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        store: Arc<dyn TransactionStore>,
        quota: Arc<dyn QuotaLedger>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::with_retry(
            gateway,
            store,
            quota,
            sink,
            CallbackRetryConfig::default(),
            StoreRetryConfig::default(),
        )
    }

    /// Create an orchestrator with explicit retry settings.
    #[must_use]
    pub fn with_retry(
        gateway: Arc<dyn ProviderGateway>,
        store: Arc<dyn TransactionStore>,
        quota: Arc<dyn QuotaLedger>,
        sink: Arc<dyn NotificationSink>,
        callback_retry: CallbackRetryConfig,
        store_retry: StoreRetryConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            quota,
            sink,
            callback_retry,
            store_retry,
            parked: ParkedCallbacks::new(),
            anomalies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start a verification for a caller request.
    ///
    /// Consent and mandatory identity fields are checked before any
    /// collaborator is contacted; the quota reservation is taken before the
    /// provider submission and released if the submission fails. Once the
    /// provider has issued a transaction id, the store write is retried with
    /// that same id rather than ever re-submitting.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for missing fields or non-affirmative
    /// consent, [`Error::QuotaExceeded`] when the ledger denies the caller,
    /// and gateway errors from the submission itself.
    pub async fn initiate(
        &self,
        caller_reference_id: &str,
        identity: &SubjectIdentity,
        consent: Consent,
    ) -> Result<InitiateReceipt> {
        identity.validate()?;
        if !consent.is_affirmative() {
            return Err(Error::InvalidInput(
                "explicit subject consent is required".to_string(),
            ));
        }

        // At most one transaction per logical request: a repeated initiate
        // for the same reference returns the existing receipt.
        if let Some(existing) = self.store.find_by_caller_reference(caller_reference_id)? {
            info!(
                "Reference {} already mapped to transaction {}; returning existing receipt",
                caller_reference_id, existing.transaction_id
            );
            return Ok(InitiateReceipt {
                transaction_id: existing.transaction_id,
                status: existing.status,
            });
        }

        if !self.quota.authorize(caller_reference_id)? {
            return Err(Error::QuotaExceeded(caller_reference_id.to_string()));
        }

        let request = SearchRequest::new(identity, consent);
        let ack = match self.gateway.submit(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                if let Err(release_err) = self.quota.release(caller_reference_id) {
                    warn!(
                        "Failed to release reservation for {}: {}",
                        caller_reference_id, release_err
                    );
                }
                return Err(e);
            }
        };

        let txn = VerificationTransaction::new(
            ack.transaction_id.clone(),
            caller_reference_id,
            identity.fingerprint(),
        );
        self.persist_new_transaction(&txn).await?;

        info!(
            "Verification {} initiated for reference {}",
            txn.transaction_id, caller_reference_id
        );
        Ok(InitiateReceipt {
            transaction_id: txn.transaction_id,
            status: txn.status,
        })
    }

    /// Fetch the current state of a transaction.
    ///
    /// Terminal transactions are served from the store with zero provider
    /// calls, so polling is idempotent and unlimited. For a live
    /// transaction, a provider failure leaves the record untouched and the
    /// last-known-good state is returned — an outage degrades to "still
    /// processing" rather than an error.
    ///
    /// # Errors
    ///
    /// [`Error::TransactionNotFound`] when no record exists for the id.
    pub async fn poll(&self, transaction_id: &str) -> Result<VerificationTransaction> {
        let record = self
            .store
            .get(transaction_id)?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

        if record.is_final() {
            debug!(
                "Poll for {} served from store ({:?})",
                transaction_id, record.status
            );
            return Ok(record);
        }

        let payload = match self.gateway.fetch_result(transaction_id).await {
            Ok(payload) => payload,
            Err(Error::TransactionNotFound(_)) => {
                // We hold a record the provider claims not to know. Worth a
                // human look, but the caller just sees the stored state.
                self.record_anomaly(
                    transaction_id,
                    "provider reports no record for a stored transaction",
                );
                return Ok(record);
            }
            Err(e) => {
                warn!(
                    "Provider fetch for {} failed; returning stored state: {}",
                    transaction_id, e
                );
                return Ok(record);
            }
        };

        self.apply_observation(transaction_id, payload, UpdateSource::Poll)
    }

    /// Ingest a raw webhook callback body pushed by the provider.
    ///
    /// Returns promptly: slow work (notification dispatch, parked retries)
    /// runs on spawned tasks. Delivery may race `initiate`'s store write,
    /// arrive out of order, or repeat; every case converges on the same
    /// record state.
    ///
    /// # Errors
    ///
    /// [`Error::CallbackUnrecognized`] only for an outright malformed
    /// envelope (no transaction id extractable) — the one case an HTTP
    /// boundary should answer with 4xx. Body-level failures are recorded as
    /// anomalies and reported in the disposition instead.
    pub async fn ingest_callback(&self, raw: &str) -> Result<CallbackDisposition> {
        let envelope = CallbackEnvelope::parse(raw)?;
        let transaction_id = envelope.transaction_id.clone();

        let payload = match envelope.normalize() {
            Ok(payload) => payload,
            Err(e) => {
                self.record_anomaly(&transaction_id, format!("callback rejected: {e}"));
                return Ok(CallbackDisposition::Rejected {
                    transaction_id,
                    reason: e.to_string(),
                });
            }
        };

        match self.store.get(&transaction_id)? {
            None => {
                // The callback outran the initiator's persistence. Park it
                // and let the retry task apply it once the record lands.
                if self.parked.park(&transaction_id, payload) {
                    info!(
                        "Callback for unknown transaction {} parked for retry",
                        transaction_id
                    );
                    self.spawn_parked_retry(transaction_id.clone());
                }
                Ok(CallbackDisposition::Parked { transaction_id })
            }
            Some(existing) if existing.is_final() => {
                let record =
                    self.apply_observation(&transaction_id, payload, UpdateSource::Callback)?;
                Ok(CallbackDisposition::AlreadyFinal {
                    transaction_id,
                    status: record.status,
                })
            }
            Some(_) => {
                let record =
                    self.apply_observation(&transaction_id, payload, UpdateSource::Callback)?;
                Ok(CallbackDisposition::Applied {
                    transaction_id,
                    status: record.status,
                })
            }
        }
    }

    /// Apply one provider observation to the stored record.
    ///
    /// The single transition function shared by both delivery channels:
    /// read the record, compute the next status, and attempt a
    /// compare-and-swap keyed on the status just read. A losing writer
    /// re-reads and converges on the winner's state.
    fn apply_observation(
        &self,
        transaction_id: &str,
        payload: ProviderResultPayload,
        source: UpdateSource,
    ) -> Result<VerificationTransaction> {
        let mut last_seen = None;

        for _ in 0..CAS_ATTEMPTS {
            let record = self
                .store
                .get(transaction_id)?
                .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

            if record.is_final() {
                let observed = payload.as_status();
                if observed != record.status {
                    self.record_anomaly(
                        transaction_id,
                        format!(
                            "discarded {observed:?} observation from {source:?} on terminal {:?}",
                            record.status
                        ),
                    );
                } else {
                    debug!(
                        "Duplicate terminal observation for {} from {:?}",
                        transaction_id, source
                    );
                }
                // Re-attempt settlement in case a prior winner crashed
                // between the status swap and the ledger call.
                self.finalize(&record);
                return Ok(record);
            }

            let next = payload.as_status();
            if next == record.status {
                // InProgress re-reported; nothing to write.
                return Ok(record);
            }

            let update = StatusUpdate {
                status: next,
                result: match &payload {
                    ProviderResultPayload::Completed(result) => Some(result.clone()),
                    _ => None,
                },
                source,
                finalized_at: next.is_terminal().then(Utc::now),
            };

            match self.store.update_status(transaction_id, record.status, update)? {
                CasOutcome::Applied(updated) => {
                    info!(
                        "Transaction {} advanced {:?} -> {:?} via {:?}",
                        transaction_id, record.status, updated.status, source
                    );
                    if updated.is_final() {
                        self.finalize(&updated);
                    }
                    return Ok(updated);
                }
                CasOutcome::Conflict => {
                    debug!(
                        "CAS conflict on {} from {:?}; re-reading",
                        transaction_id, source
                    );
                    last_seen = Some(record);
                }
            }
        }

        // Persistent conflicts mean other writers keep advancing the
        // record; hand back whatever is current.
        self.store
            .get(transaction_id)?
            .or(last_seen)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))
    }

    /// Settle quota and dispatch the finalization notification.
    ///
    /// Guarded by the store's quota swap: of all writers observing the
    /// terminal state, exactly one wins the swap, calls the ledger, and
    /// publishes the event.
    fn finalize(&self, record: &VerificationTransaction) {
        let target = if record.status == TransactionStatus::Completed {
            QuotaState::Committed
        } else {
            QuotaState::Released
        };

        match self.store.settle_quota(&record.transaction_id, target) {
            Ok(true) => {
                let ledger_outcome = if target == QuotaState::Committed {
                    self.quota.commit(&record.caller_reference_id)
                } else {
                    self.quota.release(&record.caller_reference_id)
                };
                if let Err(e) = ledger_outcome {
                    error!(
                        "Quota {:?} for {} failed after settlement swap: {}",
                        target, record.transaction_id, e
                    );
                    self.record_anomaly(
                        &record.transaction_id,
                        format!("ledger call failed after quota swap: {e}"),
                    );
                }
                self.dispatch_notification(record);
            }
            Ok(false) => {
                // The other channel settled first.
            }
            Err(e) => {
                warn!(
                    "Quota settlement check for {} failed: {}",
                    record.transaction_id, e
                );
            }
        }
    }

    /// Publish the finalization event without blocking the caller.
    fn dispatch_notification(&self, record: &VerificationTransaction) {
        let sink = Arc::clone(&self.sink);
        let event = VerificationEvent::Finalized {
            transaction_id: record.transaction_id.clone(),
            caller_reference_id: record.caller_reference_id.clone(),
            status: record.status,
            case_count: record.result.as_ref().map(|r| r.case_count),
        };
        tokio::spawn(async move {
            if let Err(e) = sink.publish(event).await {
                warn!("Notification dispatch failed: {e}");
            }
        });
    }

    /// Persist the freshly-initiated record, retrying with the same
    /// provider-issued id on store failure.
    async fn persist_new_transaction(&self, txn: &VerificationTransaction) -> Result<()> {
        let attempts = self.store_retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.create(txn) {
                // AlreadyExists: a previous attempt (or a duplicate initiate
                // retry) got the write through; idempotent on the id.
                Ok(_) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    error!(
                        "Transaction {} was submitted to the provider but could not be \
                         persisted; manual reconciliation required: {}",
                        txn.transaction_id, e
                    );
                    self.record_anomaly(
                        &txn.transaction_id,
                        format!("submitted but not persisted after {attempt} attempts: {e}"),
                    );
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(
                        "Store write for {} failed (attempt {}/{}): {}",
                        txn.transaction_id, attempt, attempts, e
                    );
                    tokio::time::sleep(self.store_retry.backoff()).await;
                }
            }
        }
    }

    /// Retry a parked callback until its record appears or attempts run out.
    fn spawn_parked_retry(&self, transaction_id: String) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let retry = orchestrator.callback_retry.clone();
            for attempt in 1..=retry.max_attempts {
                tokio::time::sleep(retry.backoff(attempt)).await;

                match orchestrator.store.get(&transaction_id) {
                    Ok(Some(_)) => {
                        let Some(payload) = orchestrator.parked.take(&transaction_id) else {
                            // Another path already applied it.
                            return;
                        };
                        match orchestrator.apply_observation(
                            &transaction_id,
                            payload,
                            UpdateSource::Callback,
                        ) {
                            Ok(record) => info!(
                                "Parked callback for {} applied on attempt {} ({:?})",
                                transaction_id, attempt, record.status
                            ),
                            Err(e) => orchestrator.record_anomaly(
                                &transaction_id,
                                format!("parked callback failed to apply: {e}"),
                            ),
                        }
                        return;
                    }
                    Ok(None) => debug!(
                        "Record for parked callback {} not present (attempt {}/{})",
                        transaction_id, attempt, retry.max_attempts
                    ),
                    Err(e) => warn!(
                        "Store read for parked callback {} failed: {}",
                        transaction_id, e
                    ),
                }
            }

            if orchestrator.parked.take(&transaction_id).is_some() {
                orchestrator.record_anomaly(
                    &transaction_id,
                    "parked callback expired; record never appeared within the retry window",
                );
            }
        });
    }

    /// Record an anomaly for manual review and fan it out to subscribers.
    fn record_anomaly(&self, transaction_id: &str, detail: impl Into<String>) {
        let detail = detail.into();
        warn!("Anomaly on {}: {}", transaction_id, detail);

        let mut anomalies = self.anomalies.lock();
        if anomalies.len() >= ANOMALY_CAPACITY {
            anomalies.remove(0);
        }
        anomalies.push(Anomaly {
            transaction_id: transaction_id.to_string(),
            detail: detail.clone(),
            at: Utc::now(),
        });
        drop(anomalies);

        let sink = Arc::clone(&self.sink);
        let event = VerificationEvent::AnomalyRecorded {
            transaction_id: transaction_id.to_string(),
            detail,
        };
        tokio::spawn(async move {
            let _ = sink.publish(event).await;
        });
    }

    /// Snapshot of recorded anomalies, oldest first.
    #[must_use]
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.anomalies.lock().clone()
    }

    /// Number of callbacks currently parked awaiting their record.
    #[must_use]
    pub fn parked_callbacks(&self) -> usize {
        self.parked.len()
    }
}
