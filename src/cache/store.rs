//! Cache Store Module
//!
//! Bounded key/value storage combining a HashMap with LRU tracking and TTL expiration.
//! Backs both the memory tier and the process-local [`InMemoryBackend`](super::InMemoryBackend).

use std::collections::HashMap;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{LruTracker, MAX_KEY_LENGTH};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    /// Expiration timestamp (Unix milliseconds)
    expires_at: u64,
    /// Bytes charged against the store's budget
    size: usize,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

// == Cache Store ==
/// Bounded storage with LRU eviction and per-entry TTL.
///
/// Two limits apply: an entry count and a byte budget. Values stored with
/// [`CacheStore::set`] are charged nothing, so only the count applies to them.
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: HashMap<String, Slot<V>>,
    lru: LruTracker,
    max_entries: usize,
    max_bytes: usize,
    used_bytes: usize,
    evictions: u64,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` values (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self::with_byte_budget(max_entries, usize::MAX)
    }

    /// Creates a store that also keeps the summed value sizes under `max_bytes`.
    pub fn with_byte_budget(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            used_bytes: 0,
            evictions: 0,
        }
    }

    // == Set ==
    /// Stores a value under `key` for `ttl_secs` seconds.
    ///
    /// Overwrites replace the previous value and reset its TTL. At capacity
    /// the least recently used entry is evicted.
    pub fn set(&mut self, key: String, value: V, ttl_secs: u64) -> Result<()> {
        self.set_sized(key, value, ttl_secs, 0)
    }

    /// Like [`CacheStore::set`], charging `size` bytes against the budget.
    ///
    /// Least recently used entries are evicted until both limits hold. A
    /// value larger than the whole budget is rejected.
    pub fn set_sized(&mut self, key: String, value: V, ttl_secs: u64, size: usize) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(EngineError::InvalidRequest(format!(
                "Key must be 1..={} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if size > self.max_bytes {
            return Err(EngineError::InvalidRequest(format!(
                "Value of {} bytes exceeds the {} byte budget",
                size, self.max_bytes
            )));
        }

        if let Some(previous) = self.entries.remove(&key) {
            self.used_bytes -= previous.size;
            self.lru.remove(&key);
        }
        while self.entries.len() >= self.max_entries
            || self.used_bytes.saturating_add(size) > self.max_bytes
        {
            if !self.evict_oldest() {
                break;
            }
        }

        let expires_at = current_timestamp_ms().saturating_add(ttl_secs.saturating_mul(1000));
        self.lru.touch(&key);
        self.used_bytes += size;
        self.entries.insert(
            key,
            Slot {
                value,
                expires_at,
                size,
            },
        );
        Ok(())
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(key) = self.lru.evict_oldest() else {
            return false;
        };
        if let Some(slot) = self.entries.remove(&key) {
            self.used_bytes -= slot.size;
        }
        self.evictions += 1;
        true
    }

    // == Get ==
    /// Returns a clone of the value if present and not expired.
    ///
    /// Expired entries are removed on access.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = current_timestamp_ms();
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            self.delete(key);
            return None;
        }
        self.lru.touch(key);
        self.entries.get(key).map(|slot| slot.value.clone())
    }

    /// Returns the live value under `key` without touching LRU order.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| &slot.value)
    }

    /// True if a live value is stored under `key`. Does not affect LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    // == Delete ==
    /// Removes an entry, returning whether one was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        match self.entries.remove(key) {
            Some(slot) => {
                self.used_bytes -= slot.size;
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            self.delete(key);
        }
        keys.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.delete(key);
        }
        if self.entries.capacity() > self.max_entries.saturating_mul(2) {
            self.entries.shrink_to(self.max_entries);
        }
        expired_keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.used_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Bytes currently charged against the budget.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}
