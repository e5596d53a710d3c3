//! Poll side: read status and result records for an identifier.
//!
//! Reads never fail. A missing key, an expired key, an unparseable
//! identifier and an unreachable store all look the same to the caller.

use crate::model::{Status, WorkId};
use crate::store::StatusStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct StatusReader {
    store: Arc<dyn StatusStore>,
}

impl StatusReader {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Current status of a submission.
    pub async fn get_status(&self, id: WorkId) -> Status {
        let raw = match self.store.get(&id.status_key()).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(work_id = %id, error = %e, "status read failed");
                None
            }
        };
        let status = Status::from_store(raw.as_deref());
        debug!(work_id = %id, %status, "status read");
        metrics::status_reads().add(1, &[KeyValue::new("status", status.to_string())]);
        status
    }

    /// Status for an identifier in its textual form. Unparseable input is `Invalid`.
    pub async fn status_of(&self, raw_id: &str) -> Status {
        match raw_id.parse::<WorkId>() {
            Ok(id) => self.get_status(id).await,
            Err(_) => {
                metrics::status_reads().add(1, &[KeyValue::new("status", "Invalid")]);
                Status::Invalid
            }
        }
    }

    /// Raw stored result. Performs no status check; `None` means not available.
    pub async fn get_result(&self, id: WorkId) -> Option<String> {
        match self.store.get(&id.result_key()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(work_id = %id, error = %e, "result read failed");
                None
            }
        }
    }

    /// Result for an identifier in its textual form.
    pub async fn result_of(&self, raw_id: &str) -> Option<String> {
        let id = raw_id.parse::<WorkId>().ok()?;
        self.get_result(id).await
    }
}
