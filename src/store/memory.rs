//! In-memory transaction store.
//!
//! Reference implementation of [`TransactionStore`] over a mutex-guarded
//! map. The conditional-write semantics match what a production backend
//! provides with a conditional update on the status column, so orchestrator
//! behavior is identical under either.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CasOutcome, CreateOutcome, StatusUpdate, StoreError, TransactionStore};
use crate::transaction::{QuotaState, TransactionStatus, VerificationTransaction};

/// Write statistics for monitoring and tests.
#[derive(Debug, Default, Clone)]
pub struct StoreStats {
    /// Fresh records written.
    pub creates: u64,
    /// Status CAS writes that were applied.
    pub cas_applied: u64,
    /// Status CAS writes that lost to another writer.
    pub cas_conflicts: u64,
    /// Quota-state swaps performed.
    pub quota_settlements: u64,
}

/// Mutex-guarded keyed map of transaction records.
#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    inner: Arc<Mutex<HashMap<String, VerificationTransaction>>>,
    stats: Arc<Mutex<StoreStats>>,
}

impl InMemoryTransactionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current write statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn create(&self, txn: &VerificationTransaction) -> Result<CreateOutcome, StoreError> {
        let mut records = self.inner.lock();
        if records.contains_key(&txn.transaction_id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(txn.transaction_id.clone(), txn.clone());
        self.stats.lock().creates += 1;
        Ok(CreateOutcome::Created)
    }

    fn get(&self, transaction_id: &str) -> Result<Option<VerificationTransaction>, StoreError> {
        Ok(self.inner.lock().get(transaction_id).cloned())
    }

    fn find_by_caller_reference(
        &self,
        caller_reference_id: &str,
    ) -> Result<Option<VerificationTransaction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .values()
            .find(|txn| txn.caller_reference_id == caller_reference_id)
            .cloned())
    }

    fn update_status(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<CasOutcome, StoreError> {
        let mut records = self.inner.lock();
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::UnknownTransaction(transaction_id.to_string()))?;

        // Terminal records are absorbing regardless of the expected status.
        if record.status.is_terminal() || record.status != expected {
            self.stats.lock().cas_conflicts += 1;
            return Ok(CasOutcome::Conflict);
        }
        if update.result.is_some() && record.result.is_some() {
            return Err(StoreError::ResultAlreadySet(transaction_id.to_string()));
        }

        record.status = update.status;
        if let Some(result) = update.result {
            record.result = Some(result);
        }
        record.last_update_source = update.source;
        if record.finalized_at.is_none() {
            record.finalized_at = update.finalized_at;
        }

        let updated = record.clone();
        drop(records);
        self.stats.lock().cas_applied += 1;
        Ok(CasOutcome::Applied(updated))
    }

    fn settle_quota(
        &self,
        transaction_id: &str,
        target: QuotaState,
    ) -> Result<bool, StoreError> {
        let mut records = self.inner.lock();
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::UnknownTransaction(transaction_id.to_string()))?;

        if record.quota_state != QuotaState::Uncommitted || target == QuotaState::Uncommitted {
            return Ok(false);
        }
        record.quota_state = target;
        drop(records);
        self.stats.lock().quota_settlements += 1;
        Ok(true)
    }
}
