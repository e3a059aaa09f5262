//! Wire types and payload normalization for the CCRV provider.
//!
//! The provider reports progress through two channels with the same inner
//! `data` object: the fetch-result response body and the webhook callback's
//! `payload` field. Both normalize into [`ProviderResultPayload`]; any shape
//! that does not match a known status is a typed parse error rather than a
//! silently-logged unknown.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transaction::{CaseRecord, Consent, SubjectIdentity, TransactionStatus, VerificationResult};

/// Search request body sent to the provider's initiate-search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    /// Subject's full name.
    pub name: String,
    /// Subject's residential address.
    pub address: String,
    /// Father's name, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    /// Date of birth in `YYYY-MM-DD`, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<chrono::NaiveDate>,
    /// Explicit consent marker; the provider expects `"Y"`.
    pub consent: Consent,
}

impl SearchRequest {
    /// Build a request from validated identity attributes.
    #[must_use]
    pub fn new(identity: &SubjectIdentity, consent: Consent) -> Self {
        Self {
            name: identity.name.clone(),
            address: identity.address.clone(),
            father_name: identity.father_name.clone(),
            date_of_birth: identity.date_of_birth,
            consent,
        }
    }
}

/// Acknowledgment returned by the provider's initiate-search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAck {
    /// Provider-issued transaction id.
    pub transaction_id: String,
    /// Status the provider reported at submission, for logging.
    #[serde(default)]
    pub ccrv_status: Option<String>,
}

/// Normalized provider observation, shared by polling and callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResultPayload {
    /// Background search still running.
    InProgress,
    /// Search finished successfully.
    Completed(VerificationResult),
    /// Search failed on the provider side.
    Failed {
        /// Provider-supplied failure description.
        reason: String,
    },
    /// Subject underage; the provider refuses to search.
    Minor,
    /// Subject's region not covered by the provider.
    RegionUnsupported,
}

impl ProviderResultPayload {
    /// The internal status this observation maps to.
    #[must_use]
    pub fn as_status(&self) -> TransactionStatus {
        match self {
            Self::InProgress => TransactionStatus::InProgress,
            Self::Completed(_) => TransactionStatus::Completed,
            Self::Failed { .. } => TransactionStatus::Failed,
            Self::Minor => TransactionStatus::Minor,
            Self::RegionUnsupported => TransactionStatus::RegionNotSupported,
        }
    }

    /// Whether this observation maps to a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.as_status().is_terminal()
    }
}

/// Inner `data` object carried by both delivery channels.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultData {
    /// Provider numeric status code, kept for diagnostics.
    #[serde(default)]
    pub code: Option<i64>,
    /// Provider status word driving the transition.
    pub ccrv_status: String,
    /// Result payload, present when the search completed.
    #[serde(default)]
    pub ccrv_data: Option<CcrvData>,
    /// Human-readable provider message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Case data attached to a completed search.
#[derive(Debug, Clone, Deserialize)]
pub struct CcrvData {
    /// Number of cases found; derived from `cases` when absent.
    #[serde(default)]
    pub case_count: Option<u32>,
    /// The cases themselves.
    #[serde(default)]
    pub cases: Vec<CaseRecord>,
    /// Reference to the provider's PDF report artifact.
    #[serde(default)]
    pub report_url: Option<String>,
}

impl ResultData {
    /// Normalize the raw provider status into a typed observation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallbackUnrecognized`] when `ccrv_status` is not a
    /// known status word, or a completed status carries no `ccrv_data`.
    pub fn normalize(self) -> Result<ProviderResultPayload> {
        match self.ccrv_status.to_ascii_lowercase().as_str() {
            "in_progress" => Ok(ProviderResultPayload::InProgress),
            "completed" => {
                let data = self.ccrv_data.ok_or_else(|| {
                    Error::CallbackUnrecognized(
                        "completed status without ccrv_data".to_string(),
                    )
                })?;
                let case_count = data
                    .case_count
                    .unwrap_or(u32::try_from(data.cases.len()).unwrap_or(u32::MAX));
                Ok(ProviderResultPayload::Completed(VerificationResult {
                    case_count,
                    cases: data.cases,
                    report_url: data.report_url,
                }))
            }
            "failed" => Ok(ProviderResultPayload::Failed {
                reason: self.message.unwrap_or_else(|| {
                    format!("provider reported failure (code {:?})", self.code)
                }),
            }),
            "minor" => Ok(ProviderResultPayload::Minor),
            "region_not_supported" => Ok(ProviderResultPayload::RegionUnsupported),
            other => Err(Error::CallbackUnrecognized(format!(
                "unknown ccrv_status {other:?} (code {:?})",
                self.code
            ))),
        }
    }
}

/// Fetch-result response body: `{ "data": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultEnvelope {
    /// The status object.
    pub data: ResultData,
}

/// Webhook callback envelope pushed by the provider.
///
/// The provider may retry delivery; duplicate envelopes are harmless
/// because all transitions are idempotent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEnvelope {
    /// Provider-issued transaction id this callback refers to.
    pub transaction_id: String,
    /// Platform reference echoed back by the provider.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Authentication scheme tag on the callback.
    #[serde(default)]
    pub auth_type: Option<String>,
    /// The status payload.
    pub payload: ResultEnvelope,
}

impl CallbackEnvelope {
    /// Parse a raw callback body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallbackUnrecognized`] when the envelope is not
    /// valid JSON of the expected shape or carries a blank transaction id.
    /// This is the "outright malformed" case an HTTP boundary may answer
    /// with a 4xx.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(raw)
            .map_err(|e| Error::CallbackUnrecognized(format!("malformed envelope: {e}")))?;
        if envelope.transaction_id.trim().is_empty() {
            return Err(Error::CallbackUnrecognized(
                "envelope missing transaction id".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Normalize the inner payload, consuming the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallbackUnrecognized`] when the payload body does
    /// not match a known status shape.
    pub fn normalize(self) -> Result<ProviderResultPayload> {
        self.payload.data.normalize()
    }
}
