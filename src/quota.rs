//! Quota ledger contract consumed by the orchestrator.
//!
//! The ledger authorizes new verifications and debits exactly one credit
//! per completed verification. The orchestrator guarantees at-most-one
//! `commit` per transaction via a store-level compare-and-swap; the ledger
//! still tolerates duplicate calls as defense in depth.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Errors raised by a quota ledger.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The ledger backend failed.
    #[error("quota ledger unavailable: {0}")]
    Backend(String),
}

/// Per-caller verification credit accounting.
///
/// `authorize` reserves capacity without debiting and must be safe to call
/// even if the subsequent provider submission fails — the reservation is
/// explicitly released in that case.
pub trait QuotaLedger: Send + Sync {
    /// Reserve one credit for a caller reference. Returns `false` when the
    /// caller has no capacity left. Re-authorizing a reference that already
    /// holds an active reservation succeeds without reserving again.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Backend`] if the ledger cannot be reached.
    fn authorize(&self, caller_reference_id: &str) -> Result<bool, QuotaError>;

    /// Convert a reservation into a permanent debit. Duplicate commits for
    /// the same reference are tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Backend`] if the ledger cannot be reached.
    fn commit(&self, caller_reference_id: &str) -> Result<(), QuotaError>;

    /// Return an unused reservation. Unknown or already-settled references
    /// are tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Backend`] if the ledger cannot be reached.
    fn release(&self, caller_reference_id: &str) -> Result<(), QuotaError>;
}

#[derive(Default)]
struct LedgerState {
    available: u64,
    reserved: HashSet<String>,
    committed: HashSet<String>,
}

/// In-memory ledger over a fixed credit pool.
///
/// Reference implementation for tests and the CLI; a deployment wires the
/// billing service here instead.
#[derive(Clone)]
pub struct InMemoryQuotaLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryQuotaLedger {
    /// Create a ledger holding `credits` verification credits.
    #[must_use]
    pub fn with_credits(credits: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                available: credits,
                ..LedgerState::default()
            })),
        }
    }

    /// Credits not yet reserved or committed.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.state.lock().available
    }

    /// Number of permanently debited references.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.state.lock().committed.len()
    }
}

impl QuotaLedger for InMemoryQuotaLedger {
    fn authorize(&self, caller_reference_id: &str) -> Result<bool, QuotaError> {
        let mut state = self.state.lock();
        if state.reserved.contains(caller_reference_id) {
            debug!(
                "Reference {} already holds a reservation",
                caller_reference_id
            );
            return Ok(true);
        }
        if state.committed.contains(caller_reference_id) {
            // The logical request was already billed; no new capacity.
            return Ok(false);
        }
        if state.available == 0 {
            return Ok(false);
        }
        state.available -= 1;
        state.reserved.insert(caller_reference_id.to_string());
        Ok(true)
    }

    fn commit(&self, caller_reference_id: &str) -> Result<(), QuotaError> {
        let mut state = self.state.lock();
        if state.committed.contains(caller_reference_id) {
            warn!(
                "Duplicate quota commit for {} ignored",
                caller_reference_id
            );
            return Ok(());
        }
        if !state.reserved.remove(caller_reference_id) {
            warn!(
                "Quota commit for {} without an active reservation",
                caller_reference_id
            );
        }
        state.committed.insert(caller_reference_id.to_string());
        Ok(())
    }

    fn release(&self, caller_reference_id: &str) -> Result<(), QuotaError> {
        let mut state = self.state.lock();
        if state.reserved.remove(caller_reference_id) {
            state.available += 1;
        }
        Ok(())
    }
}
