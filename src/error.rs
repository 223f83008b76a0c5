//! Error types for the prop engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::ErrorResponse;

// == Engine Error Enum ==
/// Unified error type for the prop engine.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// An operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Upstream dependency unreachable or returned an unusable response
    #[error("Network error: {0}")]
    Network(String),

    /// A prop result failed the validation gate
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Call rejected without an attempt because the breaker is open
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// A cache tier could not be read or written
    #[error("Cache tier unavailable: {0}")]
    CacheTierUnavailable(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == Error Kind ==
/// Coarse classification of an [`EngineError`], used in task reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    Validation,
    CircuitOpen,
    CacheTierUnavailable,
    InvalidRequest,
    Internal,
}

impl EngineError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Network(_) => ErrorKind::Network,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            EngineError::CacheTierUnavailable(_) => ErrorKind::CacheTierUnavailable,
            EngineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for failures that say something about the health of an upstream
    /// dependency and should therefore count against its circuit breaker.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, EngineError::Timeout(_) | EngineError::Network(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout(err.to_string())
        } else if err.is_decode() {
            EngineError::Validation(err.to_string())
        } else {
            EngineError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Validation(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidRequest(_) | EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Network(_) => StatusCode::BAD_GATEWAY,
            EngineError::CircuitOpen(_) | EngineError::CacheTierUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the prop engine.
pub type Result<T> = std::result::Result<T, EngineError>;
