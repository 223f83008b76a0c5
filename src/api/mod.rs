//! API Module
//!
//! HTTP handlers and routing for the prop engine REST API.
//!
//! # Endpoints
//! - `GET /props/:game_id` - Props for a game
//! - `GET /props/entity/:entity_id` - Prop for one entity
//! - `GET /stats` - Cache statistics
//! - `GET /circuits` - Circuit breaker status
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
