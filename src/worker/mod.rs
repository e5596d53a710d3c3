//! Consumer worker: consume, classify, write result and status back.
//!
//! One sequential loop per worker instance. Throughput scales by running more
//! instances in the same consumer group, each owning a disjoint partition set.

mod assignment;
mod retry;

pub use assignment::PartitionAssignment;
pub use retry::RetryPolicy;

use crate::broker::{Consumer, Delivery, Record, TopicPartition};
use crate::error::{Error, Result};
use crate::model::{STATUS_TTL, Status, WorkId, WorkItem};
use crate::rule::classify;
use crate::store::StatusStore;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_status_transition, start_process_span};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Configuration for one worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Ingest topic to subscribe to.
    pub topic: String,
    /// Applied to transient consume errors and to failed store writes.
    pub retry: RetryPolicy,
    /// Commit stored offsets after this many processed records.
    pub commit_every: u32,
    /// Expiry for result and status records.
    pub ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            topic: "raw-input".to_string(),
            retry: RetryPolicy::default(),
            commit_every: 1,
            ttl: STATUS_TTL,
        }
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Default)]
pub struct ProcessorReport {
    pub processed: u64,
    pub skipped: u64,
    pub consume_errors: u64,
    /// Partitions held at the moment the loop ended.
    pub assignment: Vec<TopicPartition>,
}

enum Flow {
    Continue,
    Stop,
}

/// The consume/process/write loop.
pub struct Processor<C: Consumer> {
    consumer: C,
    store: Arc<dyn StatusStore>,
    config: WorkerConfig,
    assignment: PartitionAssignment,
    report: ProcessorReport,
    uncommitted: u32,
}

impl<C: Consumer> Processor<C> {
    pub fn new(consumer: C, store: Arc<dyn StatusStore>, config: WorkerConfig) -> Self {
        Self {
            consumer,
            store,
            config,
            assignment: PartitionAssignment::new(),
            report: ProcessorReport::default(),
            uncommitted: 0,
        }
    }

    /// Run until `shutdown` is cancelled, then commit and leave the group.
    ///
    /// Cancellation is a normal stop and returns `Ok`. An error is returned
    /// only for a non-transient consumer failure or an exhausted retry cap.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ProcessorReport> {
        self.consumer.subscribe(&self.config.topic).await?;
        info!(topic = %self.config.topic, "worker subscribed");

        let outcome = self.consume_loop(&shutdown).await;

        // Flush stored offsets and leave the group so another member picks
        // up whatever this one had not committed.
        info!("closing consumer");
        let closed = self.consumer.close().await;
        if let Err(ref e) = closed {
            error!(error = %e, "consumer close failed");
        }
        outcome?;
        closed?;

        self.report.assignment = self.assignment.partitions();
        info!(
            processed = self.report.processed,
            consume_errors = self.report.consume_errors,
            "worker stopped"
        );
        Ok(self.report)
    }

    async fn consume_loop(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let mut failures = 0u32;
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                delivery = self.consumer.recv() => delivery,
            };

            match delivery {
                Ok(delivery) => {
                    failures = 0;
                    if let Flow::Stop = self.handle(delivery, shutdown).await? {
                        return Ok(());
                    }
                }
                Err(e) if e.is_transient() => {
                    let exhausted = self.config.retry.record_failure(&mut failures);
                    self.report.consume_errors += 1;
                    metrics::consume_errors().add(1, &[]);
                    warn!(error = %e, failures, "consume error");
                    if exhausted {
                        return Err(e.into());
                    }
                    if !self.pause(shutdown).await {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn handle(&mut self, delivery: Delivery, shutdown: &CancellationToken) -> Result<Flow> {
        match delivery {
            Delivery::Message(record) => return self.process(record, shutdown).await,
            Delivery::PartitionEof { tp, offset } => {
                debug!(partition = %tp, offset, "reached end of partition");
            }
            Delivery::Assigned(added) => {
                self.assignment.assign(&added);
                metrics::partitions_rebalanced().add(1, &[KeyValue::new("kind", "assigned")]);
                info!(
                    added = %join(&added),
                    all = %self.assignment,
                    "partitions incrementally assigned"
                );
            }
            Delivery::Revoked(removed) => {
                self.assignment.revoke(&removed);
                metrics::partitions_rebalanced().add(1, &[KeyValue::new("kind", "revoked")]);
                info!(
                    revoked = %join(&removed),
                    remaining = %self.assignment,
                    "partitions incrementally revoked"
                );
            }
            Delivery::Lost(lost) => {
                let held = self.assignment.lose();
                metrics::partitions_rebalanced().add(1, &[KeyValue::new("kind", "lost")]);
                warn!(
                    lost = %join(&lost),
                    held = %join(&held),
                    "partitions lost"
                );
            }
        }
        Ok(Flow::Continue)
    }

    async fn process(&mut self, record: Record, shutdown: &CancellationToken) -> Result<Flow> {
        let item = match decode(&record) {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    key = %record.key,
                    error = %e,
                    "skipping undecodable record"
                );
                self.report.skipped += 1;
                self.consumer.store_offset(&record)?;
                return Ok(Flow::Continue);
            }
        };

        let span = start_process_span(&item.id, record.partition, record.offset);
        let start = Instant::now();
        let result = classify(item.payload);

        let written = self
            .persist(item, &result, shutdown)
            .instrument(span.clone())
            .await?;
        if !written {
            // Cancelled mid-retry: leave the offset unstored for redelivery.
            return Ok(Flow::Stop);
        }
        record_status_transition(&span, Status::Dispatched, Status::Processed);
        span.in_scope(|| info!(payload = item.payload, result = %result, "work processed"));

        self.consumer.store_offset(&record)?;
        self.report.processed += 1;
        metrics::work_processed().add(1, &[]);
        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "work.process")],
        );

        self.uncommitted += 1;
        if self.uncommitted >= self.config.commit_every.max(1) {
            self.uncommitted = 0;
            if let Err(e) = self.consumer.commit().await {
                warn!(error = %e, "offset commit failed");
            }
        }
        Ok(Flow::Continue)
    }

    /// Write result then status, retrying store failures. Both writes are
    /// plain overwrites, so repeating them is harmless.
    ///
    /// Returns `false` if shutdown interrupted the retries.
    async fn persist(
        &self,
        item: WorkItem,
        result: &str,
        shutdown: &CancellationToken,
    ) -> Result<bool> {
        let mut failures = 0u32;
        loop {
            match self.write_outcome(item.id, result).await {
                Ok(()) => return Ok(true),
                Err(e) => {
                    let exhausted = self.config.retry.record_failure(&mut failures);
                    warn!(work_id = %item.id, error = %e, failures, "result write failed");
                    if exhausted {
                        return Err(e);
                    }
                    if !self.pause(shutdown).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Result first: a reader that sees `Processed` must find the result.
    async fn write_outcome(&self, id: WorkId, result: &str) -> Result<()> {
        self.store
            .set(&id.result_key(), result, self.config.ttl)
            .await?;
        let processed = Status::Processed
            .as_store_value()
            .ok_or_else(|| Error::Other("processed status has no store form".to_string()))?;
        self.store
            .set(&id.status_key(), processed, self.config.ttl)
            .await
    }

    /// Sleep the retry delay. Returns `false` if shutdown came first.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.config.retry.delay) => true,
        }
    }
}

/// Key is the identifier, value the JSON-encoded payload.
fn decode(record: &Record) -> Result<WorkItem> {
    let id: WorkId = record
        .key
        .parse()
        .map_err(|e| Error::Other(format!("record key is not an identifier: {e}")))?;
    let payload: i64 = serde_json::from_slice(&record.value)?;
    Ok(WorkItem { id, payload })
}

fn join(tps: &[TopicPartition]) -> String {
    let ids: Vec<String> = tps.iter().map(|tp| tp.partition.to_string()).collect();
    format!("[{}]", ids.join(","))
}
