//! Configuration Module
//!
//! Handles loading and managing engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{TierTimeouts, TierTtls};
use crate::resilience::CircuitBreakerConfig;

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of entries held in the in-process tier
    pub memory_max_entries: usize,
    /// Memory tier byte budget in megabytes
    pub memory_max_mb: usize,
    /// TTL in seconds for the memory tier
    pub memory_ttl: u64,
    /// TTL in seconds for the distributed tier
    pub distributed_ttl: u64,
    /// TTL in seconds for the durable tier
    pub durable_ttl: u64,
    /// Deadline in milliseconds for one distributed tier call
    pub distributed_timeout_ms: u64,
    /// Deadline in milliseconds for one durable tier call
    pub durable_timeout_ms: u64,
    /// Remote payloads at least this large are gzip compressed
    pub compress_min_bytes: usize,
    /// Consecutive failures before a breaker opens
    pub breaker_failure_threshold: u32,
    /// Seconds an open breaker waits before allowing a trial call
    pub breaker_recovery_secs: u64,
    /// Items per executor sub-batch
    pub batch_size: usize,
    /// Executor semaphore permits
    pub max_concurrency: usize,
    /// Per-task executor timeout in seconds
    pub task_timeout_secs: u64,
    /// Timeout for a single data-source fetch
    pub fetch_timeout_secs: u64,
    /// Timeout for a single compute prediction
    pub predict_timeout_secs: u64,
    /// Below this success ratio a computed response is DEGRADED
    pub min_success_ratio: f64,
    /// Cap on entities fanned out per game
    pub max_entities_per_game: usize,
    /// Seconds between cache warming cycles
    pub warm_interval_secs: u64,
    /// Number of active games warmed per cycle
    pub warm_max_games: usize,
    /// Tracked entities warmed every cycle
    pub warm_entities: Vec<String>,
    /// Capacity of the warming work queue
    pub warm_queue_capacity: usize,
    /// Seconds between housekeeping passes
    pub housekeeping_interval_secs: u64,
    /// Base URL of the distributed key/value cache service
    pub distributed_cache_url: Option<String>,
    /// Directory for the durable file tier
    pub durable_cache_dir: Option<String>,
    /// Base URL of the stats data source
    pub data_source_url: Option<String>,
    /// Base URL of the ML compute service
    pub compute_url: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `MEMORY_MAX_ENTRIES` - Memory tier capacity (default: 1000)
    /// - `MEMORY_MAX_MB` - Memory tier byte budget (default: 256)
    /// - `MEMORY_TTL` / `DISTRIBUTED_TTL` / `DURABLE_TTL` - Tier TTLs (default: 300 / 1800 / 3600)
    /// - `DISTRIBUTED_TIMEOUT_MS` / `DURABLE_TIMEOUT_MS` - Remote tier deadlines (default: 50 / 200)
    /// - `COMPRESS_MIN_BYTES` - Remote payload compression threshold (default: 1024)
    /// - `BREAKER_FAILURE_THRESHOLD` - Failures before opening (default: 5)
    /// - `BREAKER_RECOVERY_SECS` - Open duration before a trial (default: 60)
    /// - `BATCH_SIZE` / `MAX_CONCURRENCY` - Executor shape (default: 25 / 10)
    /// - `TASK_TIMEOUT_SECS` - Per-task timeout (default: 30)
    /// - `FETCH_TIMEOUT_SECS` / `PREDICT_TIMEOUT_SECS` - Upstream call timeouts (default: 10 / 15)
    /// - `MIN_SUCCESS_RATIO` - OK/DEGRADED cut-off (default: 0.5)
    /// - `MAX_ENTITIES_PER_GAME` - Fan-out cap (default: 30)
    /// - `WARM_INTERVAL_SECS` - Warming cycle interval (default: 600)
    /// - `WARM_MAX_GAMES` - Active games warmed per cycle (default: 5)
    /// - `WARM_ENTITIES` - Comma separated tracked entity ids (default: none)
    /// - `WARM_QUEUE_CAPACITY` - Warming queue bound (default: 64)
    /// - `HOUSEKEEPING_INTERVAL_SECS` - Housekeeping interval (default: 300)
    /// - `DISTRIBUTED_CACHE_URL`, `DURABLE_CACHE_DIR`, `DATA_SOURCE_URL`, `COMPUTE_URL` - optional
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            memory_max_entries: env_or("MEMORY_MAX_ENTRIES", defaults.memory_max_entries),
            memory_max_mb: env_or("MEMORY_MAX_MB", defaults.memory_max_mb),
            memory_ttl: env_or("MEMORY_TTL", defaults.memory_ttl),
            distributed_ttl: env_or("DISTRIBUTED_TTL", defaults.distributed_ttl),
            durable_ttl: env_or("DURABLE_TTL", defaults.durable_ttl),
            distributed_timeout_ms: env_or(
                "DISTRIBUTED_TIMEOUT_MS",
                defaults.distributed_timeout_ms,
            ),
            durable_timeout_ms: env_or("DURABLE_TIMEOUT_MS", defaults.durable_timeout_ms),
            compress_min_bytes: env_or("COMPRESS_MIN_BYTES", defaults.compress_min_bytes),
            breaker_failure_threshold: env_or(
                "BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_recovery_secs: env_or("BREAKER_RECOVERY_SECS", defaults.breaker_recovery_secs),
            batch_size: env_or("BATCH_SIZE", defaults.batch_size),
            max_concurrency: env_or("MAX_CONCURRENCY", defaults.max_concurrency),
            task_timeout_secs: env_or("TASK_TIMEOUT_SECS", defaults.task_timeout_secs),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs),
            predict_timeout_secs: env_or("PREDICT_TIMEOUT_SECS", defaults.predict_timeout_secs),
            min_success_ratio: env_or("MIN_SUCCESS_RATIO", defaults.min_success_ratio),
            max_entities_per_game: env_or("MAX_ENTITIES_PER_GAME", defaults.max_entities_per_game),
            warm_interval_secs: env_or("WARM_INTERVAL_SECS", defaults.warm_interval_secs),
            warm_max_games: env_or("WARM_MAX_GAMES", defaults.warm_max_games),
            warm_entities: env::var("WARM_ENTITIES")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            warm_queue_capacity: env_or("WARM_QUEUE_CAPACITY", defaults.warm_queue_capacity),
            housekeeping_interval_secs: env_or(
                "HOUSEKEEPING_INTERVAL_SECS",
                defaults.housekeeping_interval_secs,
            ),
            distributed_cache_url: env_opt("DISTRIBUTED_CACHE_URL"),
            durable_cache_dir: env_opt("DURABLE_CACHE_DIR"),
            data_source_url: env_opt("DATA_SOURCE_URL"),
            compute_url: env_opt("COMPUTE_URL"),
        }
    }

    /// Tier TTLs derived from the memory/distributed/durable settings.
    pub fn tier_ttls(&self) -> TierTtls {
        TierTtls {
            memory: self.memory_ttl,
            distributed: self.distributed_ttl,
            durable: self.durable_ttl,
        }
    }

    pub fn tier_timeouts(&self) -> TierTimeouts {
        TierTimeouts {
            distributed: Duration::from_millis(self.distributed_timeout_ms),
            durable: Duration::from_millis(self.durable_timeout_ms),
        }
    }

    pub fn memory_max_bytes(&self) -> usize {
        self.memory_max_mb.saturating_mul(1024 * 1024)
    }

    /// Shared by the upstream breakers and the remote tier breakers.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            recovery_timeout: self.breaker_recovery_timeout(),
        }
    }

    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            memory_max_entries: 1000,
            memory_max_mb: 256,
            memory_ttl: 300,
            distributed_ttl: 1800,
            durable_ttl: 3600,
            distributed_timeout_ms: 50,
            durable_timeout_ms: 200,
            compress_min_bytes: 1024,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 60,
            batch_size: 25,
            max_concurrency: 10,
            task_timeout_secs: 30,
            fetch_timeout_secs: 10,
            predict_timeout_secs: 15,
            min_success_ratio: 0.5,
            max_entities_per_game: 30,
            warm_interval_secs: 600,
            warm_max_games: 5,
            warm_entities: Vec::new(),
            warm_queue_capacity: 64,
            housekeeping_interval_secs: 300,
            distributed_cache_url: None,
            durable_cache_dir: None,
            data_source_url: None,
            compute_url: None,
        }
    }
}

// == Env Helpers ==
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
