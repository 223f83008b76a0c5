//! Integration Tests for the Prop Computation Engine
//!
//! Drives the engine end to end against scripted collaborators and
//! recording cache tiers.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{baseline_harness, entities, harness, Behavior, ScriptedCompute, ScriptedData};
use prop_engine::cache::{CacheBackend, CacheEntry, Tier};
use prop_engine::engine::{entity_key, game_key, GAME_KEY_PREFIX, PREDICTION_SOURCE};
use prop_engine::models::{PropResult, ResponseStatus, Source};
use prop_engine::resilience::CircuitState;
use prop_engine::Config;

// == Cold And Warm Paths ==

#[tokio::test]
async fn test_cold_request_populates_every_tier() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", entities("P", 5)),
    );
    let key = game_key("G1");

    let cold = h.engine.get_props("G1", 10).await;
    assert_eq!(cold.status, ResponseStatus::Ok);
    assert_eq!(cold.source, Source::Compute);
    assert_eq!(cold.items.len(), 5);
    assert_eq!(cold.items[0].entity_id, "P0");

    assert_eq!(h.durable.ttl_of(&key), Some(3600));
    assert_eq!(h.distributed.ttl_of(&key), Some(1800));
    let memory = h.engine.cache().memory_entry(&key).await.unwrap();
    assert_eq!(memory.ttl_secs, 300);

    let started = Instant::now();
    let warm = h.engine.get_props("G1", 10).await;
    assert!(started.elapsed() < Duration::from_millis(10));
    assert_eq!(warm.source, Source::Memory);
    assert!(warm.took_ms < 10);
    assert_eq!(warm.items, cold.items);
    assert_eq!(h.data.fetches(), 5, "warm request must not touch the data source");
}

#[tokio::test]
async fn test_durable_hit_is_promoted() {
    let h = baseline_harness(Config::default(), ScriptedData::new());
    let key = game_key("G2");
    let entry = CacheEntry::new(
        key.clone(),
        vec![PropResult::new("P9", 0.7, 0.2, 1.5)],
        3600,
        Tier::Durable,
    );
    h.durable
        .set(&key, entry.to_payload().unwrap(), 3600)
        .await
        .unwrap();

    let first = h.engine.get_props("G2", 10).await;
    assert_eq!(first.source, Source::Durable);
    assert_eq!(first.items.len(), 1);
    assert_eq!(h.distributed.ttl_of(&key), Some(1800));
    let promoted = h.engine.cache().memory_entry(&key).await.unwrap();
    assert_eq!(promoted.stored_at_ms, entry.stored_at_ms);
    assert_eq!(promoted.ttl_secs, 300);

    let second = h.engine.get_props("G2", 10).await;
    assert_eq!(second.source, Source::Memory);
    assert_eq!(h.data.listings(), 0);
}

#[tokio::test]
async fn test_limit_keeps_highest_confidence() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", entities("P", 5)),
    );

    let response = h.engine.get_props("G1", 2).await;
    let ids: Vec<_> = response.items.iter().map(|p| p.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["P0", "P1"]);

    // The full list is cached once and every limit is served from it.
    let cached = h.engine.cache().memory_entry(&game_key("G1")).await.unwrap();
    assert_eq!(cached.items.len(), 5);
    let wider = h.engine.get_props("G1", 10).await;
    assert_eq!(wider.source, Source::Memory);
    assert_eq!(wider.items.len(), 5);
    assert_eq!(h.data.fetches(), 5);
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", entities("P", 3)),
    );
    h.engine.get_props("G1", 10).await;
    let refreshed = h.engine.refresh("G1").await;

    assert_eq!(refreshed.source, Source::Compute);
    assert_eq!(h.data.fetches(), 6);
}

#[tokio::test]
async fn test_entity_prop_cached_under_own_key() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", vec![("592450", Behavior::Confidence(0.65))]),
    );

    let first = h.engine.get_entity_prop("592450").await;
    assert_eq!(first.status, ResponseStatus::Ok);
    assert_eq!(first.source, Source::Compute);
    assert_eq!(h.durable.ttl_of(&entity_key("592450")), Some(3600));

    let second = h.engine.get_entity_prop("592450").await;
    assert_eq!(second.source, Source::Memory);
    assert_eq!(h.data.fetches(), 1);
}

// == Circuit Breaker ==

#[tokio::test]
async fn test_open_circuit_returns_degraded_without_calling_upstream() {
    let config = Config {
        breaker_failure_threshold: 2,
        ..Config::default()
    };
    let h = baseline_harness(config, ScriptedData::new().failing());

    for _ in 0..2 {
        let response = h.engine.get_props("G1", 10).await;
        assert_eq!(response.status, ResponseStatus::Degraded);
    }
    assert_eq!(h.data.listings(), 2);

    let rejected = h.engine.get_props("G1", 10).await;
    assert_eq!(rejected.status, ResponseStatus::Degraded);
    assert_eq!(rejected.source, Source::Unavailable);
    assert!(rejected.items.is_empty());
    assert_eq!(h.data.listings(), 2, "open circuit must not attempt the call");

    let data_source = &h.engine.circuit_status()[0];
    assert_eq!(data_source.name, "data_source");
    assert_eq!(data_source.state, CircuitState::Open);
    assert!(!h.engine.is_healthy());
}

#[tokio::test]
async fn test_degraded_results_are_not_cached() {
    let config = Config {
        breaker_failure_threshold: 100,
        ..Config::default()
    };
    let h = baseline_harness(
        config,
        ScriptedData::new().game(
            "G1",
            vec![
                ("A", Behavior::Fail),
                ("B", Behavior::Fail),
                ("C", Behavior::Confidence(0.7)),
            ],
        ),
    );

    let response = h.engine.get_props("G1", 10).await;
    assert_eq!(response.status, ResponseStatus::Degraded);
    assert_eq!(response.items.len(), 1, "best-effort items still returned");
    assert!(h.durable.writes().is_empty());
    assert!(h.engine.cache().memory_entry(&game_key("G1")).await.is_none());
}

// == Validation Gate ==

#[tokio::test]
async fn test_out_of_range_confidence_never_cached() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new()
            .game(
                "G1",
                vec![
                    ("A", Behavior::Confidence(1.5)),
                    ("B", Behavior::Confidence(0.7)),
                    ("C", Behavior::Confidence(0.6)),
                    ("D", Behavior::Confidence(0.8)),
                ],
            )
            .game("G2", vec![("X", Behavior::Confidence(1.5))]),
    );

    let mixed = h.engine.get_props("G1", 10).await;
    assert_eq!(mixed.status, ResponseStatus::Ok);
    assert_eq!(mixed.items.len(), 3);
    assert!(mixed.items.iter().all(|p| p.entity_id != "A"));
    let cached = h.engine.cache().memory_entry(&game_key("G1")).await.unwrap();
    assert!(cached.items.iter().all(|p| p.confidence <= 1.0));

    let invalid = h.engine.get_props("G2", 10).await;
    assert_eq!(invalid.status, ResponseStatus::Degraded);
    assert!(invalid.items.is_empty());
    assert_eq!(h.durable.ttl_of(&game_key("G2")), None);
}

#[tokio::test]
async fn test_out_of_range_ml_estimate_is_rejected() {
    let compute = Arc::new(ScriptedCompute::answering(1.5, 0.2));
    let h = harness(
        Config::default(),
        ScriptedData::new().game("G1", vec![("A", Behavior::Confidence(0.5))]),
        compute.clone(),
    );

    let response = h.engine.get_props("G1", 10).await;
    assert_eq!(compute.call_count(), 1);
    assert_eq!(response.status, ResponseStatus::Degraded);
    assert!(response.items.is_empty());
    assert!(h.engine.cache().memory_entry(&game_key("G1")).await.is_none());
    assert!(h.durable.writes().is_empty());
    assert_eq!(h.engine.cache_stats().await.blending.blends, 0);

    let entity = h.engine.get_entity_prop("A").await;
    assert!(entity.is_degraded());
    assert!(h.engine.cache().memory_entry(&entity_key("A")).await.is_none());
}

// == Fail-Open Aggregation ==

fn thirty_percent_slow() -> ScriptedData {
    let mut list: Vec<(String, Behavior)> = entities("P", 7);
    for i in 7..10 {
        list.push((format!("P{}", i), Behavior::Slow(Duration::from_millis(1500))));
    }
    ScriptedData::new().game("G1", list)
}

#[tokio::test]
async fn test_partial_timeouts_above_threshold_are_ok() {
    let config = Config {
        fetch_timeout_secs: 1,
        ..Config::default()
    };
    let h = baseline_harness(config, thirty_percent_slow());

    let started = Instant::now();
    let response = h.engine.get_props("G1", 10).await;
    assert!(started.elapsed() < Duration::from_millis(1450));

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.items.len(), 7);
    assert!(h.engine.cache().memory_entry(&game_key("G1")).await.is_some());
}

#[tokio::test]
async fn test_partial_timeouts_below_threshold_are_degraded() {
    let config = Config {
        fetch_timeout_secs: 1,
        min_success_ratio: 0.8,
        ..Config::default()
    };
    let h = baseline_harness(config, thirty_percent_slow());

    let response = h.engine.get_props("G1", 10).await;
    assert_eq!(response.status, ResponseStatus::Degraded);
    assert_eq!(response.items.len(), 7);
    assert!(h.engine.cache().memory_entry(&game_key("G1")).await.is_none());
}

#[tokio::test]
async fn test_panics_are_contained() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game(
            "G1",
            vec![
                ("A", Behavior::Confidence(0.7)),
                ("B", Behavior::Panic),
                ("C", Behavior::Confidence(0.6)),
                ("D", Behavior::Confidence(0.5)),
            ],
        ),
    );

    let partial = h.engine.get_props("G1", 10).await;
    assert_eq!(partial.status, ResponseStatus::Ok);
    assert_eq!(partial.items.len(), 3);

    let crashed = h.engine.get_props("PANIC", 10).await;
    assert_eq!(crashed.status, ResponseStatus::Degraded);
    assert_eq!(crashed.source, Source::Unavailable);
}

// == ML Blending ==

#[tokio::test]
async fn test_ml_estimate_is_blended() {
    let compute = Arc::new(ScriptedCompute::answering(0.9, 0.2));
    let h = harness(
        Config::default(),
        ScriptedData::new().game("G1", vec![("A", Behavior::Confidence(0.5))]),
        compute.clone(),
    );

    let response = h.engine.get_props("G1", 10).await;
    let prop = &response.items[0];
    assert!((prop.confidence - 0.82).abs() < 1e-9);
    assert_eq!(prop.uncertainty, 0.2);
    assert_eq!(prop.value, 2.5);
    assert_eq!(prop.metadata[PREDICTION_SOURCE], "ml");
    assert_eq!(compute.call_count(), 1);

    let blending = h.engine.cache_stats().await.blending;
    assert_eq!(blending.blends, 1);
    assert!((blending.avg_confidence_improvement - 0.32).abs() < 1e-9);
    assert!((blending.avg_uncertainty - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_ml_failure_falls_back_to_baseline() {
    let config = Config {
        breaker_failure_threshold: 2,
        max_concurrency: 1,
        ..Config::default()
    };
    let compute = Arc::new(ScriptedCompute::failing());
    let h = harness(
        config,
        ScriptedData::new().game("G1", entities("P", 4)),
        compute.clone(),
    );

    let response = h.engine.get_props("G1", 10).await;
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.items.len(), 4);
    assert!(response
        .items
        .iter()
        .all(|p| p.metadata[PREDICTION_SOURCE] == "baseline" && p.uncertainty == 1.0));
    assert_eq!(compute.call_count(), 2, "compute circuit opens after two failures");

    let compute_status = &h.engine.circuit_status()[1];
    assert_eq!(compute_status.state, CircuitState::Open);
}

// == Stats ==

#[tokio::test]
async fn test_stats_track_hits_misses_and_timings() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", entities("P", 2)),
    );
    h.engine.get_props("G1", 10).await;
    h.engine.get_props("G1", 10).await;

    let stats = h.engine.cache_stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits_by_tier[&Tier::Memory], 1);
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.memory_entries, 1);
    assert!(stats.memory_bytes > 0);
    assert!((stats.hit_rate - 0.5).abs() < 1e-9);
}

// == Invalidation ==

#[tokio::test]
async fn test_invalidated_game_is_recomputed() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new().game("G1", entities("P", 3)),
    );
    h.engine.get_props("G1", 10).await;

    let key = h.engine.invalidate_game("G1").await;
    assert_eq!(key, game_key("G1"));
    assert!(h.engine.cache().memory_entry(&key).await.is_none());
    assert!(!h.distributed.contains(&key).await);
    assert!(!h.durable.contains(&key).await);

    let again = h.engine.get_props("G1", 10).await;
    assert_eq!(again.source, Source::Compute);
    assert_eq!(h.data.fetches(), 6);
}

#[tokio::test]
async fn test_clear_memory_keeps_remote_tiers() {
    let h = baseline_harness(
        Config::default(),
        ScriptedData::new()
            .game("G1", entities("P", 2))
            .game("G2", vec![("592450", Behavior::Confidence(0.6))]),
    );
    h.engine.get_props("G1", 10).await;
    h.engine.get_entity_prop("592450").await;

    assert_eq!(h.engine.clear_memory(GAME_KEY_PREFIX).await, 1);
    let served = h.engine.get_props("G1", 10).await;
    assert_eq!(served.source, Source::Distributed);
    assert_eq!(
        h.engine.get_entity_prop("592450").await.source,
        Source::Memory
    );
}
