//! Embedded status store engine.
//!
//! Expiry runs on the tokio clock so paused-time tests can step past a TTL.
//! Expired entries are dropped lazily on read. Writes drain a deadline queue
//! up to `now`, so a write only touches keys that are actually due.

use super::StatusStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process implementation of [`StatusStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    /// Deadline -> keys written with that deadline. A key overwritten later
    /// stays queued under its old deadline and is skipped when drained.
    deadlines: Mutex<BTreeMap<Instant, Vec<String>>>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a store error.
    pub fn fail_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn evict_due(&self, now: Instant) {
        let due: Vec<String> = {
            let mut deadlines = self.deadlines.lock();
            let later = deadlines.split_off(&(now + Duration::from_nanos(1)));
            std::mem::replace(&mut *deadlines, later)
                .into_values()
                .flatten()
                .collect()
        };
        for key in due {
            self.entries.remove_if(&key, |_, e| e.expires_at <= now);
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if self.take_injected_failure() {
            return Err(Error::Store(format!("write of {key} rejected")));
        }

        let now = Instant::now();
        self.evict_due(now);

        let expires_at = now + ttl;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.deadlines
            .lock()
            .entry(expires_at)
            .or_default()
            .push(key.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone());
        if live.is_some() {
            return Ok(live);
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("a:status", "Dispatched", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(
            store.get("a:status").await.unwrap().as_deref(),
            Some("Dispatched")
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("a:status").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_resets_expiry_but_reads_do_not() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.set("k", "one", ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        store.get("k").await.unwrap();
        store.set("k", "two", ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_writes(1);
        let ttl = Duration::from_secs(10);
        assert!(store.set("k", "v", ttl).await.is_err());
        assert!(store.set("k", "v", ttl).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_evict_only_keys_that_are_due() {
        let store = MemoryStore::new();
        for n in 0..100 {
            store
                .set(&format!("short-{n}"), "Dispatched", Duration::from_secs(5))
                .await
                .unwrap();
        }
        store
            .set("long", "Dispatched", Duration::from_secs(60))
            .await
            .unwrap();
        // Rewritten with a longer TTL: the old deadline must not evict it.
        store
            .set("short-0", "Processed", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.entries.len(), 101);

        tokio::time::advance(Duration::from_secs(6)).await;
        store
            .set("fresh", "Dispatched", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.entries.len(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get("short-0").await.unwrap().as_deref(),
            Some("Processed")
        );
        assert_eq!(store.get("short-1").await.unwrap(), None);
        assert!(store.deadlines.lock().keys().all(|&d| d > Instant::now()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_do_not_lose_keys() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for t in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..250 {
                    store
                        .set(&format!("{t}-{n}"), "Dispatched", Duration::from_secs(60))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 2000);
    }
}
