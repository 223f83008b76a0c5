//! Resilience Module
//!
//! Circuit breakers for upstream dependencies and the bounded-concurrency
//! executor that runs per-entity work.

mod circuit_breaker;
mod executor;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_RECOVERY_TIMEOUT,
};
pub use executor::{BatchOutcome, BoundedConcurrencyExecutor, ComputationTask, ExecutorConfig};
