//! Cache Entry Module
//!
//! Defines cache tiers, per-tier TTLs and the immutable entry stored at each tier.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::PropResult;

/// Envelope format version written to string-valued tiers.
const PAYLOAD_VERSION: u32 = 1;

/// Marks a gzip + base64 payload. Plain payloads are JSON objects and
/// always start with `{`.
const GZIP_PREFIX: &str = "gz:";

/// Payloads at least this long are compressed by default.
pub const DEFAULT_COMPRESS_MIN_BYTES: usize = 1024;

/// Size charged for an entry whose items cannot be measured.
const UNKNOWN_SIZE_BYTES: usize = 1024;

// == Tier ==
/// One level of the cache hierarchy, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    Distributed,
    Durable,
}

impl Tier {
    /// All tiers in lookup order.
    pub const ALL: [Tier; 3] = [Tier::Memory, Tier::Distributed, Tier::Durable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Distributed => "distributed",
            Tier::Durable => "durable",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Tier TTLs ==
/// TTL in seconds for each tier. Deeper tiers keep entries longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTtls {
    pub memory: u64,
    pub distributed: u64,
    pub durable: u64,
}

impl TierTtls {
    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Memory => self.memory,
            Tier::Distributed => self.distributed,
            Tier::Durable => self.durable,
        }
    }
}

impl Default for TierTtls {
    fn default() -> Self {
        Self {
            memory: 300,
            distributed: 1800,
            durable: 3600,
        }
    }
}

// == Tier Timeouts ==
/// Deadline for a single call to each remote tier. A call that overruns
/// counts as that tier being unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    pub distributed: Duration,
    pub durable: Duration,
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self {
            distributed: Duration::from_millis(50),
            durable: Duration::from_millis(200),
        }
    }
}

// == Cache Entry ==
/// A fully resolved set of props stored at one tier.
///
/// Entries are never mutated; a newer store or a promotion replaces them.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,
    /// Validated props
    pub items: Arc<Vec<PropResult>>,
    /// When the props were computed (Unix milliseconds)
    pub stored_at_ms: u64,
    /// Lifetime counted from `stored_at_ms`
    pub ttl_secs: u64,
    /// Tier holding this entry
    pub tier: Tier,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    v: u32,
    stored_at_ms: u64,
    ttl_secs: u64,
    items: Vec<PropResult>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stored now with the given TTL.
    pub fn new(key: impl Into<String>, items: Vec<PropResult>, ttl_secs: u64, tier: Tier) -> Self {
        Self {
            key: key.into(),
            items: Arc::new(items),
            stored_at_ms: current_timestamp_ms(),
            ttl_secs,
            tier,
        }
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.stored_at_ms.saturating_add(self.ttl_secs.saturating_mul(1000))
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at_ms()
    }

    /// Returns remaining lifetime in milliseconds (0 once expired).
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at_ms().saturating_sub(current_timestamp_ms())
    }

    /// Returns remaining lifetime in whole seconds.
    pub fn ttl_remaining(&self) -> u64 {
        self.ttl_remaining_ms() / 1000
    }

    // == Promote ==
    /// Copies this entry into a faster tier.
    ///
    /// The copy keeps the source `stored_at_ms` and never outlives the
    /// entry it was read from, even when the faster tier's TTL would allow it.
    pub fn promoted(&self, tier: Tier, tier_ttl_secs: u64) -> Self {
        let age_ms = current_timestamp_ms().saturating_sub(self.stored_at_ms);
        let by_tier = age_ms.saturating_add(tier_ttl_secs.saturating_mul(1000));
        let by_source = self.ttl_secs.saturating_mul(1000);
        Self {
            key: self.key.clone(),
            items: Arc::clone(&self.items),
            stored_at_ms: self.stored_at_ms,
            ttl_secs: by_tier.min(by_source) / 1000,
            tier,
        }
    }

    /// Approximate footprint: the key plus the serialized items.
    pub fn approx_bytes(&self) -> usize {
        let items = serde_json::to_vec(self.items.as_ref())
            .map(|bytes| bytes.len())
            .unwrap_or(UNKNOWN_SIZE_BYTES);
        self.key.len() + items
    }

    // == Payload Encoding ==
    /// Serializes the entry for a string-valued tier.
    pub fn to_payload(&self) -> Result<String> {
        let payload = Payload {
            v: PAYLOAD_VERSION,
            stored_at_ms: self.stored_at_ms,
            ttl_secs: self.ttl_secs,
            items: self.items.as_ref().clone(),
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Like [`CacheEntry::to_payload`], but gzips and base64-encodes payloads
    /// of at least `min_bytes`.
    pub fn to_compressed_payload(&self, min_bytes: usize) -> Result<String> {
        let json = self.to_payload()?;
        if json.len() < min_bytes {
            return Ok(json);
        }
        let compression_failed =
            |e: std::io::Error| EngineError::Internal(format!("gzip of {} failed: {}", self.key, e));
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::fast());
        encoder.write_all(json.as_bytes()).map_err(compression_failed)?;
        let compressed = encoder.finish().map_err(compression_failed)?;
        Ok(format!("{}{}", GZIP_PREFIX, STANDARD.encode(compressed)))
    }

    /// Decodes an entry read back from `tier`, plain or compressed.
    pub fn from_payload(key: &str, raw: &str, tier: Tier) -> Result<Self> {
        let inflated;
        let json = match raw.strip_prefix(GZIP_PREFIX) {
            Some(encoded) => {
                inflated = inflate(key, encoded)?;
                inflated.as_str()
            }
            None => raw,
        };
        let payload: Payload = serde_json::from_str(json)?;
        if payload.v != PAYLOAD_VERSION {
            return Err(EngineError::Validation(format!(
                "unsupported payload version {} for {}",
                payload.v, key
            )));
        }
        Ok(Self {
            key: key.to_string(),
            items: Arc::new(payload.items),
            stored_at_ms: payload.stored_at_ms,
            ttl_secs: payload.ttl_secs,
            tier,
        })
    }
}

fn inflate(key: &str, encoded: &str) -> Result<String> {
    let compressed = STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::Validation(format!("bad base64 payload for {}: {}", key, e)))?;
    let mut json = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .map_err(|e| EngineError::Validation(format!("bad gzip payload for {}: {}", key, e)))?;
    Ok(json)
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
