//! Error types for fizzq.

use thiserror::Error;

use crate::broker::ConsumeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("status store error: {0}")]
    Store(String),

    #[error("consume error: {0}")]
    Consume(#[from] ConsumeError),

    #[error("offset commit failed: {0}")]
    Commit(String),

    #[error("undecodable record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
