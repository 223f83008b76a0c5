//! Tiered Cache Module
//!
//! MEMORY → DISTRIBUTED → DURABLE lookup with read-through back-fill.
//!
//! A tier that fails to answer is logged and treated as a miss at that
//! tier only, so the hierarchy degrades towards a full compute instead of
//! surfacing an error. Every remote call runs under its tier's deadline
//! and circuit breaker; an open breaker skips the tier without waiting.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheBackend, CacheEntry, CacheStatsReport, CacheStore, PerformanceMetrics, Tier,
    TierTimeouts, TierTtls, DEFAULT_COMPRESS_MIN_BYTES,
};
use crate::error::{EngineError, Result};
use crate::models::prop::retain_valid;
use crate::models::PropResult;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};

// == Lookup ==
/// Outcome of [`TieredCache::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(CacheEntry),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Tier that answered, `None` on a miss.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Lookup::Hit(entry) => Some(entry.tier),
            Lookup::Miss => None,
        }
    }
}

// == Remote Tier ==
struct RemoteTier {
    tier: Tier,
    backend: Arc<dyn CacheBackend>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl RemoteTier {
    fn new(tier: Tier, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            tier,
            backend,
            breaker: CircuitBreaker::new(breaker_name(tier), CircuitBreakerConfig::default()),
            timeout: tier_timeout(tier, &TierTimeouts::default()),
        }
    }

    /// Runs one backend call under the tier's deadline, recording the
    /// outcome on its breaker. Fails fast with `CircuitOpen` while open.
    async fn call<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        if !self.breaker.is_callable() {
            return Err(EngineError::CircuitOpen(self.breaker.name().to_string()));
        }
        let outcome = match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::CacheTierUnavailable(format!(
                "{} tier exceeded {}ms",
                self.tier,
                self.timeout.as_millis()
            ))),
        };
        match outcome {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        outcome
    }
}

fn breaker_name(tier: Tier) -> String {
    format!("{}_cache", tier)
}

fn tier_timeout(tier: Tier, timeouts: &TierTimeouts) -> Duration {
    match tier {
        Tier::Durable => timeouts.durable,
        _ => timeouts.distributed,
    }
}

// == Tiered Cache ==
pub struct TieredCache {
    memory: RwLock<CacheStore<CacheEntry>>,
    distributed: RemoteTier,
    durable: RemoteTier,
    ttls: TierTtls,
    compress_min_bytes: usize,
    metrics: Arc<PerformanceMetrics>,
}

impl TieredCache {
    pub fn new(
        memory_max_entries: usize,
        distributed: Arc<dyn CacheBackend>,
        durable: Arc<dyn CacheBackend>,
        ttls: TierTtls,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            memory: RwLock::new(CacheStore::new(memory_max_entries)),
            distributed: RemoteTier::new(Tier::Distributed, distributed),
            durable: RemoteTier::new(Tier::Durable, durable),
            ttls,
            compress_min_bytes: DEFAULT_COMPRESS_MIN_BYTES,
            metrics,
        }
    }

    /// Caps the summed size of memory-tier entries. Drops anything cached so far.
    pub fn with_memory_budget(mut self, max_bytes: usize) -> Self {
        let max_entries = self.memory.get_mut().max_entries();
        self.memory = RwLock::new(CacheStore::with_byte_budget(max_entries, max_bytes));
        self
    }

    pub fn with_tier_timeouts(mut self, timeouts: TierTimeouts) -> Self {
        for remote in [&mut self.distributed, &mut self.durable] {
            remote.timeout = tier_timeout(remote.tier, &timeouts);
        }
        self
    }

    pub fn with_tier_breakers(mut self, config: CircuitBreakerConfig) -> Self {
        for remote in [&mut self.distributed, &mut self.durable] {
            remote.breaker = CircuitBreaker::new(breaker_name(remote.tier), config);
        }
        self
    }

    /// Remote payloads of at least `min_bytes` are gzip compressed.
    pub fn with_compression(mut self, min_bytes: usize) -> Self {
        self.compress_min_bytes = min_bytes;
        self
    }

    /// Default TTLs applied by callers that do not override them.
    pub fn ttls(&self) -> TierTtls {
        self.ttls
    }

    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// Breaker snapshots for the distributed and durable tiers.
    pub fn circuit_status(&self) -> Vec<CircuitStatus> {
        vec![self.distributed.breaker.status(), self.durable.breaker.status()]
    }

    // == Lookup ==
    /// Looks `key` up tier by tier, fastest first.
    ///
    /// A hit at a slower tier is copied into every faster tier before
    /// returning, so the next lookup is served from memory.
    pub async fn lookup(&self, key: &str) -> Lookup {
        let started = Instant::now();

        let from_memory = self.memory.write().await.get(key);
        if let Some(entry) = from_memory.filter(|e| !e.is_expired()) {
            self.metrics.record_hit(Tier::Memory);
            debug!(key, elapsed_us = started.elapsed().as_micros() as u64, "memory hit");
            return Lookup::Hit(entry);
        }

        for (index, tier) in [Tier::Distributed, Tier::Durable].into_iter().enumerate() {
            if let Some(entry) = self.read_remote(tier, key).await {
                // Faster tiers are Memory, plus Distributed when the hit came from Durable.
                let faster = &Tier::ALL[..=index];
                for &target in faster.iter().rev() {
                    self.write_tier(entry.promoted(target, self.ttls.for_tier(target)))
                        .await;
                }
                self.metrics.record_hit(tier);
                debug!(
                    key,
                    %tier,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hit, back-filled faster tiers"
                );
                return Lookup::Hit(entry);
            }
        }

        self.metrics.record_miss();
        debug!(key, "miss at every tier");
        Lookup::Miss
    }

    async fn read_remote(&self, tier: Tier, key: &str) -> Option<CacheEntry> {
        let remote = self.remote(tier)?;
        let raw = match remote.call(remote.backend.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(EngineError::CircuitOpen(name)) => {
                debug!("{} open, skipping {} tier for {}", name, tier, key);
                return None;
            }
            Err(err) => {
                self.metrics.record_error();
                warn!("{} tier read failed for {}, treating as miss: {}", tier, key, err);
                return None;
            }
        };

        let entry = match CacheEntry::from_payload(key, &raw, tier) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Undecodable {} entry for {}: {}", tier, key, err);
                return None;
            }
        };
        if entry.is_expired() {
            return None;
        }

        let total = entry.items.len();
        let items = retain_valid(entry.items.as_ref().clone());
        if items.is_empty() {
            return None;
        }
        if items.len() == total {
            Some(entry)
        } else {
            Some(CacheEntry {
                items: Arc::new(items),
                ..entry
            })
        }
    }

    fn remote(&self, tier: Tier) -> Option<&RemoteTier> {
        match tier {
            Tier::Memory => None,
            Tier::Distributed => Some(&self.distributed),
            Tier::Durable => Some(&self.durable),
        }
    }

    /// Writes an entry to the tier it names. Failures are logged and
    /// reported as `false`.
    async fn write_tier(&self, entry: CacheEntry) -> bool {
        let ttl = entry.ttl_remaining_ms().div_ceil(1000);
        if ttl == 0 {
            return false;
        }

        let Some(remote) = self.remote(entry.tier) else {
            let key = entry.key.clone();
            let size = entry.approx_bytes();
            return match self.memory.write().await.set_sized(key, entry, ttl, size) {
                Ok(()) => true,
                Err(err) => {
                    warn!("memory tier rejected entry: {}", err);
                    false
                }
            };
        };

        let payload = match entry.to_compressed_payload(self.compress_min_bytes) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Could not encode {} for {}: {}", entry.key, entry.tier, err);
                return false;
            }
        };
        match remote.call(remote.backend.set(&entry.key, payload, ttl)).await {
            Ok(()) => true,
            Err(EngineError::CircuitOpen(name)) => {
                debug!("{} open, not writing {}", name, entry.key);
                false
            }
            Err(err) => {
                self.metrics.record_error();
                warn!("{} tier write failed for {}: {}", entry.tier, entry.key, err);
                false
            }
        }
    }

    // == Store ==
    /// Validates `items` and writes them to every tier with `ttls`.
    ///
    /// Invalid items are dropped with a warning. Tiers are written slowest
    /// first so a faster tier never holds data its slower tiers lack.
    /// Returns how many items were stored (0 when nothing survived validation).
    pub async fn store(&self, key: &str, items: Vec<PropResult>, ttls: &TierTtls) -> usize {
        let items = retain_valid(items);
        if items.is_empty() {
            warn!("Nothing valid to cache for {}", key);
            return 0;
        }

        let base = CacheEntry::new(key, items, ttls.memory, Tier::Memory);
        let count = base.items.len();
        for tier in Tier::ALL.into_iter().rev() {
            let entry = CacheEntry {
                ttl_secs: ttls.for_tier(tier),
                tier,
                ..base.clone()
            };
            self.write_tier(entry).await;
        }
        count
    }

    // == Invalidate ==
    /// Removes `key` from every tier.
    ///
    /// Returns whether the memory tier held it. Remote delete failures are
    /// logged; those tiers then expire the key on their own TTL.
    pub async fn invalidate(&self, key: &str) -> bool {
        let in_memory = self.memory.write().await.delete(key);
        for remote in [&self.distributed, &self.durable] {
            if let Err(err) = remote.call(remote.backend.delete(key)).await {
                warn!("{} tier delete failed for {}: {}", remote.tier, key, err);
            }
        }
        in_memory
    }

    /// Drops memory-tier entries whose key starts with `prefix`; an empty
    /// prefix clears the tier. Remote tiers are left to their TTLs.
    pub async fn clear_memory(&self, prefix: &str) -> usize {
        let cleared = self.memory.write().await.remove_prefixed(prefix);
        info!(prefix, cleared, "cleared memory tier");
        cleared
    }

    /// Live memory-tier entry for `key`; does not count as a lookup.
    pub async fn memory_entry(&self, key: &str) -> Option<CacheEntry> {
        self.memory.read().await.peek(key).cloned()
    }

    // == Cleanup Expired ==
    /// Drops expired memory-tier entries. Remote tiers expire on their own.
    pub async fn cleanup_expired(&self) -> usize {
        self.memory.write().await.cleanup_expired()
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStatsReport {
        let (entries, bytes, evictions) = {
            let memory = self.memory.read().await;
            (memory.len(), memory.used_bytes(), memory.evictions())
        };
        let mut report = self.metrics.snapshot(entries);
        report.memory_bytes = bytes;
        report.memory_evictions = evictions;
        report
    }
}
