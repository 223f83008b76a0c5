//! Prop computation engine.
//!
//! Per request: cache lookup, then on a miss a data-source breaker check,
//! an executor fan-out over the game's entities, confidence blending,
//! validation and a store into every tier. Nothing here returns an error to
//! the caller; every failure ends in a DEGRADED response.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStatsReport, Lookup, PerformanceMetrics, TieredCache};
use crate::config::Config;
use crate::engine::blend::{blend_confidence, ml_weight};
use crate::engine::collaborators::{
    Collaborators, Compute, DataFetch, EntityData, PredictionContext, COMPUTE, DATA_SOURCE,
    PREDICTION_SOURCE,
};
use crate::error::{EngineError, Result};
use crate::models::{PropResult, PropsResponse, Source};
use crate::resilience::{
    BoundedConcurrencyExecutor, CircuitBreaker, CircuitState, CircuitStatus, ExecutorConfig,
};
use crate::resources::ResourceManager;

/// Key prefix shared by every game's cached props.
pub const GAME_KEY_PREFIX: &str = "game_props:";

/// Key prefix shared by every entity's cached prop.
pub const ENTITY_KEY_PREFIX: &str = "entity_prop:";

/// Cache key of a game's full, confidence-ordered prop list. Request
/// limits are applied on read, so every limit shares one entry.
pub fn game_key(game_id: &str) -> String {
    format!("{}{}", GAME_KEY_PREFIX, game_id)
}

/// Cache key of a single entity's prop.
pub fn entity_key(entity_id: &str) -> String {
    format!("{}{}", ENTITY_KEY_PREFIX, entity_id)
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub min_success_ratio: f64,
    pub max_entities_per_game: usize,
    pub fetch_timeout: Duration,
    pub predict_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_success_ratio: config.min_success_ratio,
            max_entities_per_game: config.max_entities_per_game,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            predict_timeout: Duration::from_secs(config.predict_timeout_secs),
        }
    }
}

// == Entity Pipeline ==
/// Everything one entity sub-task needs; cloned into each spawned task.
#[derive(Clone)]
struct EntityPipeline {
    data: Arc<dyn DataFetch>,
    compute: Arc<dyn Compute>,
    data_breaker: Arc<CircuitBreaker>,
    compute_breaker: Arc<CircuitBreaker>,
    metrics: Arc<PerformanceMetrics>,
    settings: EngineSettings,
}

impl EntityPipeline {
    async fn call_data<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let result = with_timeout(self.settings.fetch_timeout, DATA_SOURCE, fut).await;
        record_on(&self.data_breaker, &result);
        result
    }

    /// Fetch, predict, blend and validate one entity.
    async fn compute_entity(&self, entity_id: &str, ctx: &PredictionContext) -> Result<PropResult> {
        if !self.data_breaker.is_callable() {
            return Err(EngineError::CircuitOpen(DATA_SOURCE.to_string()));
        }
        let data = self.call_data(self.data.fetch_entity_data(entity_id)).await?;
        let prop = self.predict(&data, ctx).await?;
        prop.validate()?;
        Ok(prop)
    }

    /// ML estimate blended with the baseline, or the baseline alone when
    /// the compute service is unavailable.
    ///
    /// The raw ML result is validated before blending; an out-of-range
    /// estimate fails the entity instead of being averaged into range.
    async fn predict(&self, data: &EntityData, ctx: &PredictionContext) -> Result<PropResult> {
        if self.compute.is_fallback() {
            return Ok(match self.compute.predict(data, ctx).await {
                Ok(prop) => prop,
                Err(_) => data.baseline_prop(),
            });
        }
        if !self.compute_breaker.is_callable() {
            debug!("Compute circuit open, baseline for {}", data.entity_id);
            return Ok(data.baseline_prop());
        }

        let result = with_timeout(
            self.settings.predict_timeout,
            COMPUTE,
            self.compute.predict(data, ctx),
        )
        .await;
        record_on(&self.compute_breaker, &result);

        let ml = match result {
            Ok(ml) => PropResult {
                entity_id: data.entity_id.clone(),
                ..ml
            },
            Err(err) => {
                debug!("ML prediction failed for {}, using baseline: {}", data.entity_id, err);
                return Ok(data.baseline_prop());
            }
        };
        if let Err(err) = ml.validate() {
            warn!("Rejecting ML estimate for {}: {}", data.entity_id, err);
            return Err(err);
        }

        let weight = ml_weight(ml.uncertainty);
        let confidence = blend_confidence(data.baseline_confidence, ml.confidence, ml.uncertainty);
        self.metrics
            .record_blend(confidence - data.baseline_confidence, ml.uncertainty);
        let mut prop = PropResult { confidence, ..ml };
        prop.metadata.insert(PREDICTION_SOURCE.into(), "ml".into());
        prop.metadata.insert("ml_weight".into(), weight.into());
        Ok(prop)
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    dependency: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(format!(
            "{} call exceeded {}ms",
            dependency,
            timeout.as_millis()
        ))),
    }
}

/// Successes close the breaker; only upstream failures count against it.
fn record_on<T>(breaker: &CircuitBreaker, result: &Result<T>) {
    match result {
        Ok(_) => breaker.record_success(),
        Err(err) if err.is_upstream_failure() => breaker.record_failure(),
        Err(_) => {}
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// == Engine ==
pub struct PropComputationEngine {
    cache: Arc<TieredCache>,
    executor: BoundedConcurrencyExecutor,
    pipeline: EntityPipeline,
    resources: Arc<ResourceManager>,
}

impl PropComputationEngine {
    pub fn new(
        config: &Config,
        cache: Arc<TieredCache>,
        collaborators: Collaborators,
        resources: Arc<ResourceManager>,
    ) -> Self {
        let breaker_config = config.breaker_config();
        let metrics = Arc::clone(cache.metrics());
        let executor = BoundedConcurrencyExecutor::new(ExecutorConfig {
            max_concurrency: config.max_concurrency,
            batch_size: config.batch_size,
            task_timeout: config.task_timeout(),
        });

        Self {
            cache,
            executor,
            pipeline: EntityPipeline {
                data: collaborators.data,
                compute: collaborators.compute,
                data_breaker: Arc::new(CircuitBreaker::new(DATA_SOURCE, breaker_config)),
                compute_breaker: Arc::new(CircuitBreaker::new(COMPUTE, breaker_config)),
                metrics,
                settings: EngineSettings::from_config(config),
            },
            resources,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn settings(&self) -> EngineSettings {
        self.pipeline.settings
    }

    // == Get Props ==
    /// Props for a game, at most `limit` of them, highest confidence first.
    pub async fn get_props(&self, game_id: &str, limit: usize) -> PropsResponse {
        let started = Instant::now();
        let key = game_key(game_id);

        let response = self
            .guarded(&key, started, async {
                if let Lookup::Hit(entry) = self.cache.lookup(&key).await {
                    let items = entry.items.iter().take(limit).cloned().collect();
                    return PropsResponse::ok(items, entry.tier.into(), elapsed_ms(started));
                }
                self.compute_game(game_id, &key, started).await.truncated(limit)
            })
            .await;

        self.record_timing(started);
        response
    }

    // == Refresh ==
    /// Recomputes a game's full prop list and stores it, skipping the lookup.
    pub async fn refresh(&self, game_id: &str) -> PropsResponse {
        let started = Instant::now();
        let key = game_key(game_id);
        self.guarded(&key, started, self.compute_game(game_id, &key, started))
            .await
    }

    // == Get Entity Prop ==
    /// Prop for a single entity, cached under its own key.
    pub async fn get_entity_prop(&self, entity_id: &str) -> PropsResponse {
        let started = Instant::now();
        let key = entity_key(entity_id);

        let response = self
            .guarded(&key, started, async {
                if let Lookup::Hit(entry) = self.cache.lookup(&key).await {
                    let items = entry.items.as_ref().clone();
                    return PropsResponse::ok(items, entry.tier.into(), elapsed_ms(started));
                }
                self.compute_entity_prop(entity_id, &key, started).await
            })
            .await;

        self.record_timing(started);
        response
    }

    /// Recomputes one entity's prop and stores it, skipping the lookup.
    pub async fn refresh_entity(&self, entity_id: &str) -> PropsResponse {
        let started = Instant::now();
        let key = entity_key(entity_id);
        self.guarded(&key, started, self.compute_entity_prop(entity_id, &key, started))
            .await
    }

    /// Active games from the data source, through its breaker.
    pub async fn active_games(&self) -> Result<Vec<String>> {
        if !self.pipeline.data_breaker.is_callable() {
            return Err(EngineError::CircuitOpen(DATA_SOURCE.to_string()));
        }
        self.pipeline
            .call_data(self.pipeline.data.active_games())
            .await
    }

    // == Invalidate ==
    /// Drops a game's cached props from every tier.
    pub async fn invalidate_game(&self, game_id: &str) -> String {
        let key = game_key(game_id);
        let in_memory = self.cache.invalidate(&key).await;
        info!(key, in_memory, "invalidated game props");
        key
    }

    /// Drops an entity's cached prop from every tier.
    pub async fn invalidate_entity(&self, entity_id: &str) -> String {
        let key = entity_key(entity_id);
        let in_memory = self.cache.invalidate(&key).await;
        info!(key, in_memory, "invalidated entity prop");
        key
    }

    /// Drops memory-tier entries under `prefix` (everything when empty).
    pub async fn clear_memory(&self, prefix: &str) -> usize {
        self.cache.clear_memory(prefix).await
    }

    /// Upstream breakers first, then the remote cache tiers.
    pub fn circuit_status(&self) -> Vec<CircuitStatus> {
        let mut circuits = vec![
            self.pipeline.data_breaker.status(),
            self.pipeline.compute_breaker.status(),
        ];
        circuits.extend(self.cache.circuit_status());
        circuits
    }

    /// True when every breaker is closed.
    pub fn is_healthy(&self) -> bool {
        self.circuit_status()
            .iter()
            .all(|s| s.state == CircuitState::Closed)
    }

    pub async fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats().await
    }

    // == Compute Path ==
    async fn compute_game(&self, game_id: &str, key: &str, started: Instant) -> PropsResponse {
        let pipeline = &self.pipeline;
        if !pipeline.data_breaker.is_callable() {
            warn!("Data source circuit open, degraded response for {}", key);
            return PropsResponse::degraded(Vec::new(), Source::Unavailable, elapsed_ms(started));
        }

        let mut entities = match pipeline.call_data(pipeline.data.game_entities(game_id)).await {
            Ok(entities) => entities,
            Err(err) => {
                warn!("Could not list entities for game {}: {}", game_id, err);
                return PropsResponse::degraded(Vec::new(), Source::Compute, elapsed_ms(started));
            }
        };
        let mut seen = HashSet::new();
        entities.retain(|id| seen.insert(id.clone()));
        entities.truncate(pipeline.settings.max_entities_per_game);

        let ctx = Arc::new(PredictionContext {
            game_id: Some(game_id.to_string()),
        });
        let task_pipeline = pipeline.clone();
        let outcome = self
            .executor
            .process_batches(entities, move |entity_id: String| {
                let pipeline = task_pipeline.clone();
                let ctx = Arc::clone(&ctx);
                async move { pipeline.compute_entity(&entity_id, &ctx).await }
            })
            .await;

        let ratio = outcome.success_ratio();
        let (total, failed) = (outcome.total(), outcome.failed());
        let mut items = outcome.into_results();
        items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let took_ms = elapsed_ms(started);
        if ratio >= pipeline.settings.min_success_ratio && !items.is_empty() {
            self.cache.store(key, items.clone(), &self.cache.ttls()).await;
            info!(
                "Computed {} props for game {} ({} of {} tasks failed) in {}ms",
                items.len(),
                game_id,
                failed,
                total,
                took_ms
            );
            PropsResponse::ok(items, Source::Compute, took_ms)
        } else {
            warn!(
                "Degraded props for game {}: {} of {} tasks failed, not cached",
                game_id, failed, total
            );
            PropsResponse::degraded(items, Source::Compute, took_ms)
        }
    }

    async fn compute_entity_prop(&self, entity_id: &str, key: &str, started: Instant) -> PropsResponse {
        let pipeline = &self.pipeline;
        if !pipeline.data_breaker.is_callable() {
            warn!("Data source circuit open, degraded response for {}", key);
            return PropsResponse::degraded(Vec::new(), Source::Unavailable, elapsed_ms(started));
        }

        let ctx = PredictionContext::default();
        match self
            .executor
            .execute_single(key, pipeline.compute_entity(entity_id, &ctx))
            .await
        {
            Ok(prop) => {
                let items = vec![prop];
                self.cache.store(key, items.clone(), &self.cache.ttls()).await;
                PropsResponse::ok(items, Source::Compute, elapsed_ms(started))
            }
            Err(err) => {
                warn!("Entity {} failed: {}", entity_id, err);
                PropsResponse::degraded(Vec::new(), Source::Compute, elapsed_ms(started))
            }
        }
    }

    /// Turns a panic anywhere under `fut` into a DEGRADED response.
    async fn guarded(
        &self,
        key: &str,
        started: Instant,
        fut: impl Future<Output = PropsResponse>,
    ) -> PropsResponse {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!("Panic while serving {}", key);
                self.cache.metrics().record_error();
                PropsResponse::degraded(Vec::new(), Source::Unavailable, elapsed_ms(started))
            }
        }
    }

    fn record_timing(&self, started: Instant) {
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        self.cache.metrics().record_response_time(ms);
    }
}
