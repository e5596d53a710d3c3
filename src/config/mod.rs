//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values. In local dev,
//! call `dotenvy::dotenv().ok()` first to pick up a `.env` file.

use crate::error::{Error, Result};
use crate::model::STATUS_TTL;
use crate::worker::{RetryPolicy, WorkerConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address for the submit/poll API.
    pub bind: SocketAddr,
    /// Ingest topic carrying `(identifier, payload)` records.
    pub topic: String,
    /// Partition count of the ingest topic.
    pub partitions: i32,
    /// Consumer group shared by all workers.
    pub group_id: String,
    /// Worker instances started by `serve`.
    pub workers: usize,
    pub retry_delay: Duration,
    /// Consecutive transient failures tolerated. `None` retries forever.
    pub retry_cap: Option<u32>,
    /// Poll interval hint returned to submitters.
    pub retry_after: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            topic: "raw-input".to_string(),
            partitions: 3,
            group_id: "fizz-buzz-worker".to_string(),
            workers: 2,
            retry_delay: Duration::from_millis(1000),
            retry_cap: None,
            retry_after: Duration::from_millis(1000),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, defaulting anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let partitions = parsed_var("FIZZQ_PARTITIONS", defaults.partitions)?;
        if partitions < 1 {
            return Err(Error::Config("FIZZQ_PARTITIONS must be at least 1".to_string()));
        }
        let workers = parsed_var("FIZZQ_WORKERS", defaults.workers)?;
        if workers < 1 {
            return Err(Error::Config("FIZZQ_WORKERS must be at least 1".to_string()));
        }

        Ok(Self {
            bind: parsed_var("FIZZQ_BIND", defaults.bind)?,
            topic: std::env::var("FIZZQ_TOPIC").unwrap_or(defaults.topic),
            partitions,
            group_id: std::env::var("FIZZQ_GROUP").unwrap_or(defaults.group_id),
            workers,
            retry_delay: Duration::from_millis(parsed_var("FIZZQ_RETRY_DELAY_MS", 1000u64)?),
            retry_cap: optional_var("FIZZQ_RETRY_CAP")?,
            retry_after: Duration::from_millis(parsed_var("FIZZQ_RETRY_AFTER_MS", 1000u64)?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Worker settings derived from this configuration.
    pub fn worker(&self) -> WorkerConfig {
        let mut retry = RetryPolicy::fixed(self.retry_delay);
        retry.max_consecutive = self.retry_cap;
        WorkerConfig {
            topic: self.topic.clone(),
            retry,
            commit_every: 1,
            ttl: STATUS_TTL,
        }
    }
}

fn optional_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    Ok(optional_var(name)?.unwrap_or(default))
}
