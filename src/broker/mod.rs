//! Partitioned, ordered log: producer and consumer-group contracts.
//!
//! Consumers receive rebalance notifications in-band with records, so the
//! worker owns its partition bookkeeping on a single task.

mod assignor;
mod memory;

pub use memory::{MemoryBroker, MemoryConsumer};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A record read from the log.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// Where a published record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

/// One step of a consumer-group subscription.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A record to process.
    Message(Record),
    /// The consumer has caught up with the end of a partition.
    PartitionEof { tp: TopicPartition, offset: i64 },
    /// Partitions added to this member's assignment (incremental).
    Assigned(Vec<TopicPartition>),
    /// Partitions removed from this member's assignment (incremental).
    Revoked(Vec<TopicPartition>),
    /// The member fell out of the group; these partitions are gone without
    /// an orderly hand-off.
    Lost(Vec<TopicPartition>),
}

#[derive(Debug, Clone, Error)]
pub enum ConsumeError {
    /// Retryable broker condition, e.g. topic or partition temporarily unavailable.
    #[error("{0}")]
    Transient(String),

    #[error("consumer is not subscribed")]
    NotSubscribed,

    #[error("consumer is closed")]
    Closed,

    #[error("fatal consumer error: {0}")]
    Fatal(String),
}

impl ConsumeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ConsumeError::Transient(_))
    }
}

/// Publishing side of the log.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Append `value` to `topic`, routed to a partition by `key`.
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<DeliveryReport>;
}

/// A consumer-group member.
///
/// `recv` must be cancel-safe: dropping its future loses nothing.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Join the group for `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Wait for the next record, end-of-partition marker or rebalance notice.
    async fn recv(&mut self) -> std::result::Result<Delivery, ConsumeError>;

    /// Mark `record` as fully processed. Takes effect on the next commit.
    fn store_offset(&mut self, record: &Record) -> Result<()>;

    /// Commit all stored offsets for partitions this member still owns.
    async fn commit(&mut self) -> Result<()>;

    /// Commit stored offsets and leave the group.
    async fn close(&mut self) -> Result<()>;
}
