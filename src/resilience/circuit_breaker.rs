//! Circuit breaker guarding one class of upstream dependency.
//!
//! CLOSED → OPEN once `failure_threshold` failures accumulate without a
//! success in between; OPEN → HALF_OPEN on the first [`CircuitBreaker::is_callable`]
//! after `recovery_timeout`; HALF_OPEN → CLOSED on success, → OPEN on failure.
//!
//! There is no lock on the HALF_OPEN trial slot: every caller that asks
//! while half-open is allowed through, so concurrent callers may all run a
//! trial at once. A single failure among them re-opens the circuit.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Default consecutive failures before opening.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time an open circuit waits before a trial call.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Snapshot returned by [`CircuitBreaker::status`].
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn recovery_elapsed(&self, inner: &Inner) -> bool {
        inner
            .last_failure
            .map(|at| at.elapsed() >= self.config.recovery_timeout)
            .unwrap_or(true)
    }

    /// Whether a call may be attempted now.
    pub fn is_callable(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.recovery_elapsed(&inner) {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit {} half-open, allowing trial call", self.name);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Resets the failure count and closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!("Circuit {} closed after successful call", self.name);
        }
        inner.failure_count = 0;
        inner.state = CircuitState::Closed;
    }

    /// Counts a failure and opens the circuit at the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        if inner.failure_count >= self.config.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(
                    "Circuit {} opened after {} failures",
                    self.name, inner.failure_count
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    /// Current state without side effects. An OPEN circuit whose recovery
    /// timeout has elapsed is reported as HALF_OPEN (awaiting its trial).
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.recovery_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn status(&self) -> CircuitStatus {
        let state = self.state();
        let inner = self.lock();
        CircuitStatus {
            name: self.name.clone(),
            state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_at,
        }
    }
}
