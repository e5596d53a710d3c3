//! Submission: mint an identifier, record it as dispatched, queue the work.

use crate::broker::Producer;
use crate::error::{Error, Result};
use crate::model::{STATUS_TTL, Status, WorkId};
use crate::store::StatusStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Accepts work items on the request-serving side.
///
/// Holds no mutable state of its own; safe to share across request tasks.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn StatusStore>,
    producer: Arc<dyn Producer>,
    topic: String,
    ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn StatusStore>,
        producer: Arc<dyn Producer>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            producer,
            topic: topic.into(),
            ttl: STATUS_TTL,
        }
    }

    /// Override the record expiry (defaults to [`STATUS_TTL`]).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Submit `payload` for processing and return its identifier.
    ///
    /// The status record is written before the publish so a consumer never
    /// sees a record whose status is not already `Dispatched`. If the publish
    /// fails the status record stays behind until it expires.
    pub async fn dispatch(&self, payload: i64) -> Result<WorkId> {
        let start = Instant::now();
        let id = WorkId::new();

        let outcome = self.dispatch_as(id, payload).await;
        let label = if outcome.is_ok() { "ok" } else { "error" };
        metrics::work_dispatched().add(1, &[KeyValue::new("result", label)]);
        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "work.dispatch")],
        );

        outcome.map(|()| id)
    }

    async fn dispatch_as(&self, id: WorkId, payload: i64) -> Result<()> {
        let dispatched = Status::Dispatched
            .as_store_value()
            .ok_or_else(|| Error::Other("dispatched status has no store form".to_string()))?;
        self.store
            .set(&id.status_key(), dispatched, self.ttl)
            .await?;

        let value = serde_json::to_vec(&payload)?;
        match self.producer.send(&self.topic, &id.to_string(), value).await {
            Ok(report) => {
                info!(
                    work_id = %id,
                    payload,
                    topic = %self.topic,
                    partition = report.partition,
                    offset = report.offset,
                    "work dispatched"
                );
                Ok(())
            }
            Err(e) => {
                warn!(work_id = %id, payload, error = %e, "delivery failed");
                Err(e)
            }
        }
    }
}
