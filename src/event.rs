//! Verification event system.

use tokio::sync::broadcast;

use crate::transaction::TransactionStatus;

/// Events emitted when a transaction finalizes or an anomaly is recorded.
#[derive(Debug, Clone)]
pub enum VerificationEvent {
    /// A transaction reached a terminal state. Emitted exactly once per
    /// transaction, by the writer that won the quota settlement swap.
    Finalized {
        /// Provider-issued transaction id.
        transaction_id: String,
        /// Caller reference the transaction belongs to.
        caller_reference_id: String,
        /// Terminal status reached.
        status: TransactionStatus,
        /// Number of cases found, for completed verifications.
        case_count: Option<u32>,
    },

    /// An observation was discarded or a callback could not be applied;
    /// queued here for manual review.
    AnomalyRecorded {
        /// Transaction id the anomaly refers to, when known.
        transaction_id: String,
        /// What went wrong.
        detail: String,
    },
}

/// Channel for receiving verification events.
pub type VerificationEventsChannel = broadcast::Receiver<VerificationEvent>;

/// Sender for verification events.
pub type VerificationEventsSender = broadcast::Sender<VerificationEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerificationEventsSender, VerificationEventsChannel) {
    broadcast::channel(256)
}
