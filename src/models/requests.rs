//! Request DTOs for the prop engine API
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

use crate::cache::MAX_KEY_LENGTH;

/// Largest `limit` a caller may request.
pub const MAX_LIMIT: usize = 500;

/// Default number of props returned when no limit is given.
pub const DEFAULT_LIMIT: usize = 100;

/// Longest game or entity id accepted in a path.
pub const MAX_ID_LENGTH: usize = 128;

/// Validates a game or entity id taken from a request path.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_id(what: &str, id: &str) -> Option<String> {
    if id.trim().is_empty() {
        Some(format!("{} must not be empty", what))
    } else if id.len() > MAX_ID_LENGTH {
        Some(format!("{} exceeds maximum length of {}", what, MAX_ID_LENGTH))
    } else {
        None
    }
}

/// Query string for GET /props/:game_id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropsQuery {
    /// Maximum number of props to return
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PropsQuery {
    /// Effective limit after applying the default.
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Validates the query
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match self.limit {
            Some(0) => Some("limit must be at least 1".to_string()),
            Some(n) if n > MAX_LIMIT => Some(format!("limit exceeds maximum of {}", MAX_LIMIT)),
            _ => None,
        }
    }
}

/// Query string for DELETE /cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearQuery {
    /// Only memory-tier keys starting with this are dropped; absent clears all
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ClearQuery {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.prefix().len() > MAX_KEY_LENGTH {
            Some(format!("prefix exceeds maximum length of {}", MAX_KEY_LENGTH))
        } else {
            None
        }
    }
}
