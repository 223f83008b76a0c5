//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Housekeeping: prunes expired memory-tier entries and finished task handles
//! - Cache warming: recomputes popular games and tracked entities ahead of demand

mod housekeeping;
mod warmer;

pub use housekeeping::{run_housekeeping, spawn_housekeeping};
pub use warmer::{spawn_cache_warmer, CacheWarmer, WarmJob, WarmerSettings};
