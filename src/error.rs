//! Error types for the CCRV orchestrator.

use crate::quota::QuotaError;
use crate::store::StoreError;

/// Errors surfaced by the orchestrator and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller supplied bad or missing identity fields or consent.
    /// Caller-fixable, returned synchronously from `initiate`.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller's verification quota was denied. No provider call was made.
    #[error("verification quota exceeded for caller reference {0}")]
    QuotaExceeded(String),

    /// Transport-level or 5xx failure talking to the provider. Transient;
    /// safe for the caller to retry.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the request on business grounds. Not retryable.
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),

    /// No transaction record exists for the given id.
    #[error("unknown transaction id: {0}")]
    TransactionNotFound(String),

    /// A callback payload could not be recognized. Internal anomaly; the
    /// HTTP boundary decides what the provider sees.
    #[error("unrecognized callback: {0}")]
    CallbackUnrecognized(String),

    /// Transaction store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Quota ledger failure.
    #[error("quota ledger error: {0}")]
    Quota(#[from] QuotaError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
