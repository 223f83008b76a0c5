//! Cache backend trait and the process-local implementations.
//!
//! The distributed and durable tiers are pluggable string key/value stores
//! with TTL. Any failure they report is surfaced as
//! [`EngineError::CacheTierUnavailable`] and the tiered cache treats it as a
//! miss at that tier.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::error::Result;

/// A string key/value cache with per-entry TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns the stored value, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key` for `ttl_secs` seconds.
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()>;

    /// Removes `key`; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

// == In-Memory Backend ==
/// Process-local TTL/LRU store. Stands in for a shared tier in single-node
/// deployments and tests.
#[derive(Debug)]
pub struct InMemoryBackend {
    name: String,
    store: Mutex<CacheStore<String>>,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>, max_entries: usize) -> Self {
        Self {
            name: name.into(),
            store: Mutex::new(CacheStore::new(max_entries)),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.store.lock().await.contains(key)
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.lock().await.get(key))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        self.store.lock().await.set(key.to_string(), value, ttl_secs)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.lock().await.delete(key);
        Ok(())
    }
}

// == Noop Backend ==
/// A tier that is not configured: every read misses, writes are discarded.
#[derive(Debug, Clone)]
pub struct NoopBackend {
    name: String,
}

impl NoopBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl CacheBackend for NoopBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
