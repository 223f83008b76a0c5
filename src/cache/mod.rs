//! Cache Module
//!
//! Multi-tier prop cache: an in-process LRU/TTL memory tier in front of
//! pluggable distributed and durable backends.

mod backend;
mod entry;
mod file;
mod lru;
mod remote;
mod stats;
mod store;
mod tiered;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{CacheBackend, InMemoryBackend, NoopBackend};
pub use entry::{
    current_timestamp_ms, CacheEntry, Tier, TierTimeouts, TierTtls, DEFAULT_COMPRESS_MIN_BYTES,
};
pub use file::FileBackend;
pub use lru::LruTracker;
pub use remote::{RemoteBackend, DISTRIBUTED_CACHE};
pub use stats::{
    percentile, BlendStats, CacheStatsReport, PerformanceMetrics, RESPONSE_WINDOW,
};
pub use store::CacheStore;
pub use tiered::{Lookup, TieredCache};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
