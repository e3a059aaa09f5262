//! CCRV verification transaction orchestrator.
//!
//! This crate integrates a third-party criminal-case-record-verification
//! (CCRV) provider into the KYC platform. A caller supplies identity
//! attributes and consent; the orchestrator submits a search request to the
//! provider, tracks the provider-issued transaction through client-initiated
//! polling and the provider's out-of-band completion webhook, and reconciles
//! whichever channel reports first into a single idempotent transaction
//! state.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ Orchestrator::initiate ──▶ ProviderGateway::submit
//!                   │                          │
//!                   ▼                          ▼
//!            QuotaLedger::authorize     transaction id
//!                   │                          │
//!                   └──▶ TransactionStore (REQUESTED, quota UNCOMMITTED)
//!
//! caller ──▶ Orchestrator::poll ─────┐
//!                                    ├──▶ apply_observation ──▶ CAS write
//! provider ─▶ Orchestrator::ingest_callback ┘        │
//!                                                    ▼
//!                                    first terminal observation wins:
//!                                    quota settle (exactly once) +
//!                                    NotificationSink::publish
//! ```
//!
//! Both delivery channels converge on the same compare-and-swap transition
//! function, so duplication and arbitrary interleaving of polls and
//! callbacks cannot double-charge quota or overwrite a final result.

pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod notify;
pub mod orchestrator;
pub mod provider;
pub mod quota;
pub mod store;
pub mod transaction;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use event::{create_event_channel, VerificationEvent};
pub use orchestrator::{Anomaly, CallbackDisposition, InitiateReceipt, Orchestrator};
pub use provider::{HttpProviderGateway, ProviderGateway, ProviderResultPayload};
pub use transaction::{
    Consent, QuotaState, SubjectIdentity, TransactionStatus, UpdateSource,
    VerificationResult, VerificationTransaction,
};
