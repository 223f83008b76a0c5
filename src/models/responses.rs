//! Response DTOs for the prop engine API
//!
//! Defines the structure of outgoing response bodies.

use serde::Serialize;

use crate::cache::Tier;
use crate::models::PropResult;
use crate::resilience::CircuitStatus;

/// Whether a props response is complete or best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    /// Served from cache or computed above the success threshold
    Ok,
    /// Empty or partial; callers should retry later
    Degraded,
}

/// Where the items of a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Memory,
    Distributed,
    Durable,
    Compute,
    /// Nothing was attempted (circuit open) or everything failed
    Unavailable,
}

impl From<Tier> for Source {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Memory => Source::Memory,
            Tier::Distributed => Source::Distributed,
            Tier::Durable => Source::Durable,
        }
    }
}

/// Response of `PropComputationEngine::get_props` (GET /props/:game_id)
#[derive(Debug, Clone, Serialize)]
pub struct PropsResponse {
    pub items: Vec<PropResult>,
    pub status: ResponseStatus,
    pub took_ms: u64,
    pub source: Source,
}

impl PropsResponse {
    pub fn ok(items: Vec<PropResult>, source: Source, took_ms: u64) -> Self {
        Self {
            items,
            status: ResponseStatus::Ok,
            took_ms,
            source,
        }
    }

    /// A retryable, possibly empty, best-effort response.
    pub fn degraded(items: Vec<PropResult>, source: Source, took_ms: u64) -> Self {
        Self {
            items,
            status: ResponseStatus::Degraded,
            took_ms,
            source,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ResponseStatus::Degraded
    }

    /// Keeps the first `limit` items. Items are already ordered best first.
    pub fn truncated(mut self, limit: usize) -> Self {
        self.items.truncate(limit);
        self
    }
}

/// Response body for DELETE /props/:game_id and DELETE /props/entity/:entity_id
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Success message
    pub message: String,
    /// The cache key that was invalidated
    pub key: String,
}

impl InvalidateResponse {
    pub fn new(key: String) -> Self {
        Self {
            message: "Cache entry invalidated".to_string(),
            key,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Memory-tier entries removed
    pub cleared: usize,
}

/// Response body for GET /circuits
#[derive(Debug, Clone, Serialize)]
pub struct CircuitsResponse {
    pub circuits: Vec<CircuitStatus>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status ("healthy" or "degraded")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self::with_status("healthy")
    }

    /// Reported while at least one upstream breaker is not closed.
    pub fn degraded() -> Self {
        Self::with_status("degraded")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ResponseStatus::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
    }

    #[test]
    fn test_props_response_serialize() {
        let resp = PropsResponse::ok(
            vec![PropResult::new("592450", 0.7, 0.2, 1.5)],
            Source::Memory,
            3,
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["source"], "memory");
        assert_eq!(json["items"][0]["entity_id"], "592450");
    }

    #[test]
    fn test_degraded_is_flagged() {
        let resp = PropsResponse::degraded(Vec::new(), Source::Unavailable, 1);
        assert!(resp.is_degraded());
        assert!(resp.items.is_empty());
    }

    #[test]
    fn test_truncated_keeps_leading_items() {
        let resp = PropsResponse::ok(
            vec![
                PropResult::new("a", 0.9, 0.1, 1.0),
                PropResult::new("b", 0.8, 0.1, 1.0),
                PropResult::new("c", 0.7, 0.1, 1.0),
            ],
            Source::Compute,
            2,
        )
        .truncated(2);
        let ids: Vec<_> = resp.items.iter().map(|p| p.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_invalidate_response_serialize() {
        let resp = InvalidateResponse::new("game_props:G1".to_string());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("invalidated"));
        assert!(json.contains("game_props:G1"));
    }

    #[test]
    fn test_source_from_tier() {
        assert_eq!(Source::from(Tier::Durable), Source::Durable);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("Something went wrong"));
    }
}
