//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check capacity, eviction order, promotion lifetimes and
//! breaker thresholds over generated inputs.

use proptest::prelude::*;
use std::collections::VecDeque;
use std::time::Duration;

use crate::cache::{current_timestamp_ms, CacheEntry, CacheStore, LruTracker, Tier};
use crate::models::PropResult;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// == Strategies ==
/// Small key space so generated sequences revisit keys often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}"
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set(String),
    Get(String),
    Delete(String),
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => key_strategy().prop_map(StoreOp::Set),
        2 => key_strategy().prop_map(StoreOp::Get),
        1 => key_strategy().prop_map(StoreOp::Delete),
    ]
}

/// Reference LRU: front is least recently used.
fn model_touch(model: &mut VecDeque<String>, key: &str) {
    model.retain(|k| k != key);
    model.push_back(key.to_string());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The store never holds more than its capacity, and its contents
    // match a reference LRU model after every operation.
    #[test]
    fn prop_store_matches_lru_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(store_op_strategy(), 1..80),
    ) {
        let mut store = CacheStore::new(capacity);
        let mut model: VecDeque<String> = VecDeque::new();

        for op in ops {
            match op {
                StoreOp::Set(key) => {
                    if !model.contains(&key) && model.len() >= capacity {
                        model.pop_front();
                    }
                    model_touch(&mut model, &key);
                    store.set(key, 1u32, 300).unwrap();
                }
                StoreOp::Get(key) => {
                    let hit = store.get(&key).is_some();
                    prop_assert_eq!(hit, model.contains(&key));
                    if hit {
                        model_touch(&mut model, &key);
                    }
                }
                StoreOp::Delete(key) => {
                    prop_assert_eq!(store.delete(&key), model.contains(&key));
                    model.retain(|k| k != &key);
                }
            }
            prop_assert!(store.len() <= capacity);
            prop_assert_eq!(store.len(), model.len());
        }
    }

    // Eviction always returns keys in least-recently-touched order.
    #[test]
    fn prop_lru_evicts_in_touch_order(touches in prop::collection::vec(key_strategy(), 1..60)) {
        let mut lru = LruTracker::new();
        let mut model: VecDeque<String> = VecDeque::new();
        for key in &touches {
            lru.touch(key);
            model_touch(&mut model, key);
        }

        prop_assert_eq!(lru.len(), model.len());
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(lru.evict_oldest(), Some(expected));
        }
        prop_assert!(lru.is_empty());
    }

    // A promoted copy keeps the source timestamp and never expires after it.
    #[test]
    fn prop_promotion_never_outlives_source(
        age_ms in 0u64..4_000_000,
        source_ttl in 1u64..7200,
        tier_ttl in 1u64..7200,
    ) {
        let source = CacheEntry {
            stored_at_ms: current_timestamp_ms().saturating_sub(age_ms),
            ..CacheEntry::new("k", vec![PropResult::new("1", 0.5, 0.5, 1.0)], source_ttl, Tier::Durable)
        };

        for target in [Tier::Memory, Tier::Distributed] {
            let promoted = source.promoted(target, tier_ttl);
            prop_assert_eq!(promoted.stored_at_ms, source.stored_at_ms);
            prop_assert!(promoted.expires_at_ms() <= source.expires_at_ms());
            prop_assert_eq!(promoted.tier, target);
            // Re-promoting the copy is a fixed point.
            let again = promoted.promoted(target, tier_ttl);
            prop_assert!(again.expires_at_ms() <= promoted.expires_at_ms());
        }
    }

    // A breaker opens exactly when consecutive failures reach the threshold.
    #[test]
    fn prop_breaker_opens_at_threshold(threshold in 1u32..10, failures in 0u32..20) {
        let breaker = CircuitBreaker::new(
            "data_source",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(3600),
            },
        );
        for _ in 0..failures {
            breaker.record_failure();
        }

        let expected = if failures >= threshold {
            CircuitState::Open
        } else {
            CircuitState::Closed
        };
        prop_assert_eq!(breaker.state(), expected);
        prop_assert_eq!(breaker.is_callable(), failures < threshold);

        breaker.record_success();
        prop_assert_eq!(breaker.state(), CircuitState::Closed);
        prop_assert_eq!(breaker.failure_count(), 0);
    }
}
