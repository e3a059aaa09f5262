//! Provider integration for the CCRV service.
//!
//! This module wraps the provider's three surfaces behind one normalization
//! path: the initiate-search endpoint, the fetch-result endpoint, and the
//! payload shape of the completion webhook.
//!
//! # Architecture
//!
//! ```text
//!            submit                fetch-result            webhook
//!              │                        │                     │
//!              ▼                        ▼                     ▼
//!      HttpProviderGateway      HttpProviderGateway    CallbackEnvelope
//!              │                        │                     │
//!              ▼                        └──────┬──────────────┘
//!         ProviderAck                          ▼
//!                                     ProviderResultPayload
//!                                              │
//!                                              ▼
//!                                 Orchestrator::apply_observation
//! ```
//!
//! Both delivery channels produce the same [`ProviderResultPayload`] sum
//! type, so the orchestrator has exactly one place that interprets provider
//! status codes.

mod gateway;
mod payload;

pub use gateway::{HttpProviderGateway, ProviderGateway};
pub use payload::{
    CallbackEnvelope, CcrvData, ProviderAck, ProviderResultPayload, ResultData,
    ResultEnvelope, SearchRequest,
};
