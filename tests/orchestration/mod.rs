//! Integration tests for the verification transaction orchestrator.
//!
//! These exercise the full reconciliation surface with a scripted provider
//! gateway: both delivery channels, arbitrary interleavings, duplicate
//! deliveries, and the quota/notification exactly-once guarantees.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod harness;
mod lifecycle;
mod reconciliation;
