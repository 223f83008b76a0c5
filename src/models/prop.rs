//! Prop result model and its validation gate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// A single computed prop for one entity (player).
///
/// The engine treats `value` and `metadata` as opaque; only the
/// `confidence`/`uncertainty` bounds are enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropResult {
    /// Entity (player) the prop was computed for
    pub entity_id: String,
    /// Confidence in the estimate, in [0, 1]
    pub confidence: f64,
    /// Total model uncertainty, in [0, 1]
    pub uncertainty: f64,
    /// Predicted value
    pub value: f64,
    /// Producer supplied details
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PropResult {
    pub fn new(entity_id: impl Into<String>, confidence: f64, uncertainty: f64, value: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            confidence,
            uncertainty,
            value,
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata field, replacing any previous value under `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    // == Validate ==
    /// Checks the invariants a prop must satisfy before it may be cached or
    /// returned: `confidence` and `uncertainty` in `[0, 1]`, finite `value`
    /// and a non-empty entity id.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.is_empty() {
            return Err(EngineError::Validation("empty entity id".to_string()));
        }
        if !unit_interval(self.confidence) {
            return Err(EngineError::Validation(format!(
                "confidence {} out of range for {}",
                self.confidence, self.entity_id
            )));
        }
        if !unit_interval(self.uncertainty) {
            return Err(EngineError::Validation(format!(
                "uncertainty {} out of range for {}",
                self.uncertainty, self.entity_id
            )));
        }
        if !self.value.is_finite() {
            return Err(EngineError::Validation(format!(
                "non-finite value for {}",
                self.entity_id
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn unit_interval(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}

/// Keeps the props that pass [`PropResult::validate`], logging each rejection.
pub fn retain_valid(items: Vec<PropResult>) -> Vec<PropResult> {
    items
        .into_iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Dropping malformed prop: {}", err);
                false
            }
        })
        .collect()
}
