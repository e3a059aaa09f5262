//! Notification sink for finalized verifications.
//!
//! The orchestrator publishes fire-and-forget: dispatch runs on a spawned
//! task and a sink failure never rolls back transaction state.

use async_trait::async_trait;
use tracing::debug;

use crate::event::{VerificationEvent, VerificationEventsSender};

/// Errors raised by a notification sink.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The sink could not accept the event.
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Downstream consumer of verification events (email/SMS/webhook-to-caller).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Publish an event. At-least-once delivery; consumers deduplicate on
    /// transaction id if they must.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Dispatch`] when the event cannot be handed
    /// off. The orchestrator logs and drops the error.
    async fn publish(&self, event: VerificationEvent) -> Result<(), NotifyError>;
}

/// Sink that fans events out on a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: VerificationEventsSender,
}

impl BroadcastSink {
    /// Wrap a broadcast sender.
    #[must_use]
    pub fn new(sender: VerificationEventsSender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, event: VerificationEvent) -> Result<(), NotifyError> {
        // No receivers is not a failure; events are best-effort fan-out.
        if self.sender.send(event).is_err() {
            debug!("No event subscribers; notification dropped");
        }
        Ok(())
    }
}
