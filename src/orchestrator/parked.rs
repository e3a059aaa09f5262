//! Holding area for callbacks that outran their transaction record.
//!
//! A callback can arrive before `initiate`'s store write commits. Rather
//! than discarding it, the payload is parked here keyed by transaction id
//! and re-applied by a bounded retry task once the record exists.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::provider::ProviderResultPayload;

/// Parked callback payloads keyed by transaction id.
///
/// Duplicate deliveries for a parked id replace the stored payload; the
/// retry task already watching that id picks up the latest one.
#[derive(Clone, Default)]
pub(crate) struct ParkedCallbacks {
    inner: Arc<Mutex<HashMap<String, ProviderResultPayload>>>,
}

impl ParkedCallbacks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Park a payload. Returns `true` if the id was not already parked,
    /// i.e. a retry task should be spawned for it.
    pub(crate) fn park(&self, transaction_id: &str, payload: ProviderResultPayload) -> bool {
        self.inner
            .lock()
            .insert(transaction_id.to_string(), payload)
            .is_none()
    }

    /// Remove and return the payload for an id, if still parked.
    pub(crate) fn take(&self, transaction_id: &str) -> Option<ProviderResultPayload> {
        self.inner.lock().remove(transaction_id)
    }

    /// Number of callbacks currently parked.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
