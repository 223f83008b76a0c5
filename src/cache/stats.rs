//! Cache Statistics Module
//!
//! Process-wide performance metrics: hits per tier, misses, errors, a
//! bounded window of recent response times and confidence blending totals.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::cache::Tier;

/// Number of response times kept for averages and percentiles.
pub const RESPONSE_WINDOW: usize = 1000;

// == Performance Metrics ==
/// Monotonic counters plus a ring buffer of response times.
///
/// Counters are never reset; the ring buffer drops its oldest sample once
/// it holds [`RESPONSE_WINDOW`] values.
#[derive(Debug)]
pub struct PerformanceMetrics {
    memory_hits: AtomicU64,
    distributed_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    response_times_ms: Mutex<VecDeque<f64>>,
    window: usize,
    blending: Mutex<BlendTotals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BlendTotals {
    count: u64,
    improvement_sum: f64,
    uncertainty_sum: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::with_window(RESPONSE_WINDOW)
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            memory_hits: AtomicU64::new(0),
            distributed_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            response_times_ms: Mutex::new(VecDeque::with_capacity(window)),
            window,
            blending: Mutex::new(BlendTotals::default()),
        }
    }

    // == Record Hit ==
    pub fn record_hit(&self, tier: Tier) {
        let counter = match tier {
            Tier::Memory => &self.memory_hits,
            Tier::Distributed => &self.distributed_hits,
            Tier::Durable => &self.durable_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Error ==
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Response Time ==
    pub fn record_response_time(&self, ms: f64) {
        let mut times = self
            .response_times_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if times.len() == self.window {
            times.pop_front();
        }
        times.push_back(ms);
    }

    // == Record Blend ==
    /// Records one ML blend: how far it moved confidence from the baseline,
    /// and the model's reported uncertainty.
    pub fn record_blend(&self, confidence_improvement: f64, uncertainty: f64) {
        if !confidence_improvement.is_finite() || !uncertainty.is_finite() {
            return;
        }
        let mut totals = self
            .blending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        totals.count += 1;
        totals.improvement_sum += confidence_improvement;
        totals.uncertainty_sum += uncertainty;
    }

    pub fn hits(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Memory => self.memory_hits.load(Ordering::Relaxed),
            Tier::Distributed => self.distributed_hits.load(Ordering::Relaxed),
            Tier::Durable => self.durable_hits.load(Ordering::Relaxed),
        }
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    // == Hit Rate ==
    /// hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits: u64 = Tier::ALL.iter().map(|t| self.hits(*t)).sum();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    // == Snapshot ==
    pub fn snapshot(&self, memory_entries: usize) -> CacheStatsReport {
        let mut samples: Vec<f64> = {
            let times = self
                .response_times_ms
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            times.iter().copied().collect()
        };
        samples.sort_by(|a, b| a.total_cmp(b));

        let avg = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };

        let blending = *self
            .blending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        CacheStatsReport {
            hits_by_tier: Tier::ALL.iter().map(|t| (*t, self.hits(*t))).collect(),
            misses: self.misses(),
            errors: self.errors(),
            hit_rate: self.hit_rate(),
            avg_response_time_ms: avg,
            p50: percentile(&samples, 50.0),
            p90: percentile(&samples, 90.0),
            p99: percentile(&samples, 99.0),
            samples: samples.len(),
            memory_entries,
            memory_bytes: 0,
            memory_evictions: 0,
            blending: BlendStats::from(blending),
        }
    }
}

/// Linear-interpolated percentile over an ascending slice; 0.0 when empty.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let weight = rank - lower as f64;
            sorted[lower] * (1.0 - weight) + sorted[upper] * weight
        }
    }
}

// == Stats Report ==
/// Point-in-time view handed to health and metrics surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub hits_by_tier: BTreeMap<Tier, u64>,
    pub misses: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    /// Number of response times behind the averages
    pub samples: usize,
    pub memory_entries: usize,
    /// Bytes charged against the memory tier budget
    pub memory_bytes: usize,
    pub memory_evictions: u64,
    pub blending: BlendStats,
}

/// Averages over every ML blend since startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlendStats {
    pub blends: u64,
    /// Mean of blended minus baseline confidence
    pub avg_confidence_improvement: f64,
    pub avg_uncertainty: f64,
}

impl From<BlendTotals> for BlendStats {
    fn from(totals: BlendTotals) -> Self {
        if totals.count == 0 {
            return Self {
                blends: 0,
                avg_confidence_improvement: 0.0,
                avg_uncertainty: 0.0,
            };
        }
        let n = totals.count as f64;
        Self {
            blends: totals.count,
            avg_confidence_improvement: totals.improvement_sum / n,
            avg_uncertainty: totals.uncertainty_sum / n,
        }
    }
}
