//! API Routes
//!
//! Configures the Axum router with all prop engine endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    circuits_handler, clear_cache_handler, entity_prop_handler, game_props_handler,
    health_handler, invalidate_entity_handler, invalidate_game_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /props/:game_id?limit=N` - Props for a game, highest confidence first
/// - `GET /props/entity/:entity_id` - Prop for a single entity
/// - `DELETE /props/:game_id` - Drop a game's cached props from every tier
/// - `DELETE /props/entity/:entity_id` - Drop an entity's cached prop from every tier
/// - `DELETE /cache?prefix=P` - Drop memory-tier entries whose key starts with P
/// - `GET /stats` - Cache hit rates and response-time percentiles
/// - `GET /circuits` - Circuit breaker status per dependency
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/props/entity/:entity_id",
            get(entity_prop_handler).delete(invalidate_entity_handler),
        )
        .route(
            "/props/:game_id",
            get(game_props_handler).delete(invalidate_game_handler),
        )
        .route("/cache", delete(clear_cache_handler))
        .route("/stats", get(stats_handler))
        .route("/circuits", get(circuits_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
