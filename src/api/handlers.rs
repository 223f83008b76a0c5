//! API Handlers
//!
//! HTTP request handlers for each prop engine endpoint. Handlers only
//! validate input and shape output; all behaviour lives in the engine.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::{
    CacheBackend, CacheStatsReport, FileBackend, InMemoryBackend, NoopBackend, PerformanceMetrics,
    RemoteBackend, TieredCache,
};
use crate::config::Config;
use crate::engine::{Collaborators, PropComputationEngine};
use crate::error::{EngineError, Result};
use crate::models::{
    validate_id, CircuitsResponse, ClearQuery, ClearResponse, HealthResponse, InvalidateResponse,
    PropsQuery, PropsResponse,
};
use crate::resources::{PoolConfig, ResourceManager};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PropComputationEngine>,
}

impl AppState {
    pub fn new(engine: Arc<PropComputationEngine>) -> Self {
        Self { engine }
    }

    /// Composes the tiers, collaborators and engine described by `config`.
    ///
    /// Unconfigured tiers fall back to a no-op distributed tier and a
    /// process-local durable tier.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let resources = Arc::new(ResourceManager::new(PoolConfig::default()));

        let distributed: Arc<dyn CacheBackend> = match &config.distributed_cache_url {
            Some(url) => Arc::new(RemoteBackend::new(url, resources.clone())?),
            None => Arc::new(NoopBackend::new("distributed_noop")),
        };
        let durable: Arc<dyn CacheBackend> = match &config.durable_cache_dir {
            Some(dir) => Arc::new(FileBackend::open(dir).await?),
            None => Arc::new(InMemoryBackend::new(
                "durable_memory",
                config.memory_max_entries.saturating_mul(10),
            )),
        };
        info!(
            "Cache tiers: memory({} entries, {}MB) -> {} -> {}",
            config.memory_max_entries,
            config.memory_max_mb,
            distributed.name(),
            durable.name()
        );

        let cache = TieredCache::new(
            config.memory_max_entries,
            distributed,
            durable,
            config.tier_ttls(),
            Arc::new(PerformanceMetrics::new()),
        )
        .with_memory_budget(config.memory_max_bytes())
        .with_tier_timeouts(config.tier_timeouts())
        .with_tier_breakers(config.breaker_config())
        .with_compression(config.compress_min_bytes);
        let cache = Arc::new(cache);
        let collaborators = Collaborators::from_config(config, resources.clone())?;
        let engine = PropComputationEngine::new(config, cache, collaborators, resources);

        Ok(Self::new(Arc::new(engine)))
    }
}

/// Handler for GET /props/:game_id
pub async fn game_props_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(query): Query<PropsQuery>,
) -> Result<Json<PropsResponse>> {
    if let Some(error_msg) = validate_id("game_id", &game_id).or_else(|| query.validate()) {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    Ok(Json(state.engine.get_props(&game_id, query.limit()).await))
}

/// Handler for GET /props/entity/:entity_id
pub async fn entity_prop_handler(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<PropsResponse>> {
    if let Some(error_msg) = validate_id("entity_id", &entity_id) {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    Ok(Json(state.engine.get_entity_prop(&entity_id).await))
}

/// Handler for DELETE /props/:game_id
pub async fn invalidate_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = validate_id("game_id", &game_id) {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    let key = state.engine.invalidate_game(&game_id).await;
    Ok(Json(InvalidateResponse::new(key)))
}

/// Handler for DELETE /props/entity/:entity_id
pub async fn invalidate_entity_handler(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = validate_id("entity_id", &entity_id) {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    let key = state.engine.invalidate_entity(&entity_id).await;
    Ok(Json(InvalidateResponse::new(key)))
}

/// Handler for DELETE /cache?prefix=...
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<ClearResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    let cleared = state.engine.clear_memory(query.prefix()).await;
    Ok(Json(ClearResponse { cleared }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStatsReport> {
    Json(state.engine.cache_stats().await)
}

/// Handler for GET /circuits
pub async fn circuits_handler(State(state): State<AppState>) -> Json<CircuitsResponse> {
    Json(CircuitsResponse {
        circuits: state.engine.circuit_status(),
    })
}

/// Handler for GET /health
///
/// Reports "degraded" while any breaker, upstream or cache tier, is not closed.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.engine.is_healthy() {
        Json(HealthResponse::healthy())
    } else {
        Json(HealthResponse::degraded())
    }
}
