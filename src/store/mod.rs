//! Key-value status store with per-key expiry.
//!
//! The store is the single source of truth for status and result records.
//! Writers always supply a TTL; readers never refresh it.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A shared mapping store with per-key expiry.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Set `key` to `value`, expiring `ttl` after this write.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Get the live value of `key`. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}
