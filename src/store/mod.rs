//! Durable keyed storage contract for verification transactions.
//!
//! The store is the only mutable shared resource in the system. Records are
//! mutated exclusively through conditional writes scoped to a single record:
//! create-if-absent on the primary key, compare-and-swap on the current
//! status, and compare-and-swap on the quota state. No cross-record
//! transactions are needed.
//!
//! A deployment backs this trait with storage that supports conditional
//! writes (a conditional update on a status column, a versioned put, ...).
//! [`InMemoryTransactionStore`] is the reference implementation used by
//! tests and the CLI.

mod memory;

pub use memory::{InMemoryTransactionStore, StoreStats};

use chrono::{DateTime, Utc};

use crate::transaction::{
    QuotaState, TransactionStatus, UpdateSource, VerificationResult, VerificationTransaction,
};

/// Errors raised by a transaction store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("store backend unavailable: {0}")]
    Backend(String),

    /// A write attempted to overwrite a write-once result.
    #[error("result already recorded for transaction {0}")]
    ResultAlreadySet(String),

    /// A conditional write referenced a transaction id with no record.
    #[error("no record for transaction {0}")]
    UnknownTransaction(String),
}

/// Outcome of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A fresh record was written.
    Created,
    /// A record with this transaction id already exists; nothing written.
    AlreadyExists,
}

/// Outcome of a compare-and-swap status write.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The write was applied; the updated record is returned.
    Applied(VerificationTransaction),
    /// Another writer advanced the record first; nothing written.
    Conflict,
}

/// Fields written by a status transition.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// The status being transitioned into.
    pub status: TransactionStatus,
    /// Result payload; only set alongside a `Completed` transition.
    pub result: Option<VerificationResult>,
    /// Channel that produced this transition.
    pub source: UpdateSource,
    /// Finalization time for terminal transitions.
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Keyed storage for [`VerificationTransaction`] records.
pub trait TransactionStore: Send + Sync {
    /// Write a fresh record unless one already exists for its transaction
    /// id. Idempotent on the primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    fn create(&self, txn: &VerificationTransaction) -> Result<CreateOutcome, StoreError>;

    /// Load a record by transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn get(&self, transaction_id: &str) -> Result<Option<VerificationTransaction>, StoreError>;

    /// Find the record created for a caller reference, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn find_by_caller_reference(
        &self,
        caller_reference_id: &str,
    ) -> Result<Option<VerificationTransaction>, StoreError>;

    /// Apply a status transition if and only if the record's current status
    /// equals `expected`. Terminal records never accept a write, whatever
    /// `expected` says.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownTransaction`] for a missing record and
    /// [`StoreError::ResultAlreadySet`] if the update would overwrite a
    /// stored result.
    fn update_status(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<CasOutcome, StoreError>;

    /// Swap the record's quota state from `Uncommitted` to `target`.
    /// Returns `true` only for the writer that performed the swap, making
    /// quota settlement exactly-once across channels.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownTransaction`] for a missing record.
    fn settle_quota(
        &self,
        transaction_id: &str,
        target: QuotaState,
    ) -> Result<bool, StoreError>;
}
