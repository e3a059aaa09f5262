//! Verification transaction data model.
//!
//! A [`VerificationTransaction`] is the central entity: one record per
//! provider-issued transaction id, mutated only through compare-and-swap
//! transitions in the [`store`](crate::store).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::subject_fingerprint;

/// Status of a verification transaction.
///
/// Status only moves forward: `Requested` → `InProgress` → one of the
/// terminal states. Terminal states are absorbing; later observations that
/// disagree are logged as anomalies and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Submitted to the provider, no progress reported yet.
    Requested,
    /// The provider reported its background search is running.
    InProgress,
    /// Search finished successfully; a result is attached.
    Completed,
    /// The provider's search failed.
    Failed,
    /// The subject is underage; the provider refuses to search.
    Minor,
    /// The subject's region is not covered by the provider.
    RegionNotSupported,
}

impl TransactionStatus {
    /// Returns `true` for absorbing terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Minor | Self::RegionNotSupported
        )
    }
}

/// Tracks whether the caller's verification credit has been debited.
///
/// Exactly one transition away from `Uncommitted` happens per transaction,
/// guarded by a store-level compare-and-swap, so duplicate finalization
/// signals cannot double-charge the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaState {
    /// Credit reserved at initiation, not yet settled.
    Uncommitted,
    /// Credit debited: the transaction completed successfully.
    Committed,
    /// Reservation returned: the transaction ended without a billable result.
    Released,
}

/// Which channel produced the most recent transition. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Record creation at initiation.
    Initiate,
    /// Client-initiated poll of the provider's fetch-result endpoint.
    Poll,
    /// Provider-pushed webhook callback.
    Callback,
}

/// Explicit consent marker supplied by the subject.
///
/// The provider requires an affirmative marker; anything else is rejected
/// before any collaborator is contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consent {
    /// The subject granted consent to the record search.
    #[serde(rename = "Y")]
    Granted,
    /// Consent was withheld.
    #[serde(rename = "N")]
    Denied,
}

impl Consent {
    /// Returns `true` only for an explicit affirmative marker.
    #[must_use]
    pub fn is_affirmative(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Identity attributes of the subject under verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectIdentity {
    /// Full name. Mandatory.
    pub name: String,
    /// Residential address. Mandatory.
    pub address: String,
    /// Father's name, if available.
    #[serde(default)]
    pub father_name: Option<String>,
    /// Date of birth, if available.
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

impl SubjectIdentity {
    /// Validate that mandatory fields are present and non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `name` or `address` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("subject name is required".into()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidInput("subject address is required".into()));
        }
        Ok(())
    }

    /// Derive the audit fingerprint for this identity.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        subject_fingerprint(
            &self.name,
            &self.address,
            self.father_name.as_deref(),
            self.date_of_birth.as_ref(),
        )
    }
}

/// A single court case entry in a completed verification result.
///
/// Provider data is sparse; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Court-assigned case number.
    #[serde(default)]
    pub case_number: Option<String>,
    /// Court name.
    #[serde(default)]
    pub court: Option<String>,
    /// Case type (criminal, civil, ...).
    #[serde(default)]
    pub case_type: Option<String>,
    /// Year the case was filed.
    #[serde(default)]
    pub filing_year: Option<String>,
    /// Provider's match confidence label for this case.
    #[serde(default)]
    pub match_level: Option<String>,
}

/// Result of a successfully completed verification.
///
/// Present only when the transaction status is
/// [`TransactionStatus::Completed`]; write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Number of cases found.
    pub case_count: u32,
    /// The cases themselves.
    pub cases: Vec<CaseRecord>,
    /// Reference to the provider's PDF report artifact, if issued.
    #[serde(default)]
    pub report_url: Option<String>,
}

/// The central verification transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationTransaction {
    /// Provider-issued transaction id. Primary key, immutable.
    pub transaction_id: String,
    /// Platform-issued reference correlating the transaction to the
    /// caller's request. Immutable.
    pub caller_reference_id: String,
    /// Normalized identity fingerprint for audit/search.
    pub subject_fingerprint: String,
    /// Current state-machine position.
    pub status: TransactionStatus,
    /// Result payload; set at most once, alongside the `Completed`
    /// transition.
    #[serde(default)]
    pub result: Option<VerificationResult>,
    /// Quota settlement state.
    pub quota_state: QuotaState,
    /// Channel that produced the most recent transition.
    pub last_update_source: UpdateSource,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Time the transaction reached a terminal state.
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl VerificationTransaction {
    /// Create a fresh record as written by `initiate`.
    #[must_use]
    pub fn new(
        transaction_id: impl Into<String>,
        caller_reference_id: impl Into<String>,
        subject_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            caller_reference_id: caller_reference_id.into(),
            subject_fingerprint: subject_fingerprint.into(),
            status: TransactionStatus::Requested,
            result: None,
            quota_state: QuotaState::Uncommitted,
            last_update_source: UpdateSource::Initiate,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    /// Whether the transaction has reached an absorbing terminal state.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }
}
