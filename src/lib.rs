//! Prop Engine - resilient multi-tier prop computation service
//!
//! Serves sports-prop predictions from a MEMORY → DISTRIBUTED → DURABLE
//! cache hierarchy, falling back to a circuit-guarded, bounded-concurrency
//! fan-out over slow upstream producers.

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod resilience;
pub mod resources;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use engine::PropComputationEngine;
pub use error::{EngineError, Result};
pub use tasks::{spawn_cache_warmer, spawn_housekeeping};
