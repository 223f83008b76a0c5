//! Upstream collaborators: the stats data source and the ML compute service.
//!
//! Both are capability traits. The concrete variant is chosen once, at
//! composition time, from configuration; a missing URL selects the
//! fallback variant instead of a runtime availability check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::PropResult;
use crate::resources::{endpoint, parse_base_url, ResourceManager};

/// Dependency class of the stats data source.
pub const DATA_SOURCE: &str = "data_source";
/// Dependency class of the ML compute service.
pub const COMPUTE: &str = "compute";

/// Metadata key naming which path produced a prop.
pub const PREDICTION_SOURCE: &str = "prediction_source";

// == Entity Data ==
/// Raw per-entity payload from the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub entity_id: String,
    /// Statistical (non-ML) confidence estimate
    pub baseline_confidence: f64,
    /// Statistical estimate of the prop value
    #[serde(default)]
    pub baseline_value: f64,
    /// Opaque stats forwarded to the compute service
    #[serde(default)]
    pub stats: HashMap<String, Value>,
}

impl EntityData {
    /// The prop this entity gets when no ML estimate is available.
    pub fn baseline_prop(&self) -> PropResult {
        PropResult::new(
            self.entity_id.clone(),
            self.baseline_confidence,
            1.0,
            self.baseline_value,
        )
        .with_metadata(PREDICTION_SOURCE, "baseline")
    }
}

/// Request context passed along with every prediction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictionContext {
    pub game_id: Option<String>,
}

// == Traits ==
#[async_trait]
pub trait DataFetch: Send + Sync {
    fn name(&self) -> &str;

    /// Entity ids participating in a game.
    async fn game_entities(&self, game_id: &str) -> Result<Vec<String>>;

    async fn fetch_entity_data(&self, entity_id: &str) -> Result<EntityData>;

    /// Games worth warming right now, most popular first.
    async fn active_games(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Compute: Send + Sync {
    fn name(&self) -> &str;

    /// Fallback variants are called directly; their output is not blended
    /// and is not recorded on the compute breaker.
    fn is_fallback(&self) -> bool {
        false
    }

    /// ML estimate for one entity. `confidence` is the model's confidence
    /// and `uncertainty` its total uncertainty.
    async fn predict(&self, data: &EntityData, ctx: &PredictionContext) -> Result<PropResult>;
}

// == HTTP Data Source ==
#[derive(Deserialize)]
struct EntitiesBody {
    entities: Vec<String>,
}

#[derive(Deserialize)]
struct GamesBody {
    games: Vec<String>,
}

/// Stats service reached over the pooled `data_source` client.
///
/// - `GET /games/:game_id/entities` → `{"entities": [..]}`
/// - `GET /entities/:entity_id` → [`EntityData`]
/// - `GET /games/active` → `{"games": [..]}`
pub struct HttpDataFetch {
    base_url: Url,
    resources: Arc<ResourceManager>,
}

impl HttpDataFetch {
    pub fn new(base_url: &str, resources: Arc<ResourceManager>) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            resources,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let client = self.resources.with_connection(DATA_SOURCE)?;
        let body = client
            .get(endpoint(&self.base_url, segments)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl DataFetch for HttpDataFetch {
    fn name(&self) -> &str {
        "http_data_source"
    }

    async fn game_entities(&self, game_id: &str) -> Result<Vec<String>> {
        let body: EntitiesBody = self.get_json(&["games", game_id, "entities"]).await?;
        Ok(body.entities)
    }

    async fn fetch_entity_data(&self, entity_id: &str) -> Result<EntityData> {
        self.get_json(&["entities", entity_id]).await
    }

    async fn active_games(&self) -> Result<Vec<String>> {
        let body: GamesBody = self.get_json(&["games", "active"]).await?;
        Ok(body.games)
    }
}

/// Used when no data source is configured; every call fails as a network
/// error so the breaker reflects the missing dependency.
pub struct UnavailableDataFetch;

#[async_trait]
impl DataFetch for UnavailableDataFetch {
    fn name(&self) -> &str {
        "unavailable_data_source"
    }

    async fn game_entities(&self, _game_id: &str) -> Result<Vec<String>> {
        Err(not_configured())
    }

    async fn fetch_entity_data(&self, _entity_id: &str) -> Result<EntityData> {
        Err(not_configured())
    }

    async fn active_games(&self) -> Result<Vec<String>> {
        Err(not_configured())
    }
}

fn not_configured() -> EngineError {
    EngineError::Network("no data source configured".to_string())
}

// == HTTP Compute ==
#[derive(Serialize)]
struct PredictBody<'a> {
    entity: &'a EntityData,
    context: &'a PredictionContext,
}

/// ML inference service: `POST /predict` with `{entity, context}` → [`PropResult`].
pub struct HttpCompute {
    base_url: Url,
    resources: Arc<ResourceManager>,
}

impl HttpCompute {
    pub fn new(base_url: &str, resources: Arc<ResourceManager>) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            resources,
        })
    }
}

#[async_trait]
impl Compute for HttpCompute {
    fn name(&self) -> &str {
        "http_compute"
    }

    async fn predict(&self, data: &EntityData, ctx: &PredictionContext) -> Result<PropResult> {
        let client = self.resources.with_connection(COMPUTE)?;
        let prop = client
            .post(endpoint(&self.base_url, &["predict"])?)
            .json(&PredictBody {
                entity: data,
                context: ctx,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(prop)
    }
}

/// Statistical fallback: echoes the baseline estimate with full uncertainty.
pub struct BaselineCompute;

#[async_trait]
impl Compute for BaselineCompute {
    fn name(&self) -> &str {
        "baseline_compute"
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn predict(&self, data: &EntityData, _ctx: &PredictionContext) -> Result<PropResult> {
        Ok(data.baseline_prop())
    }
}

// == Composition ==
#[derive(Clone)]
pub struct Collaborators {
    pub data: Arc<dyn DataFetch>,
    pub compute: Arc<dyn Compute>,
}

impl Collaborators {
    pub fn new(data: Arc<dyn DataFetch>, compute: Arc<dyn Compute>) -> Self {
        Self { data, compute }
    }

    /// Picks HTTP variants for configured URLs and fallbacks otherwise.
    pub fn from_config(config: &Config, resources: Arc<ResourceManager>) -> Result<Self> {
        let data: Arc<dyn DataFetch> = match &config.data_source_url {
            Some(url) => Arc::new(HttpDataFetch::new(url, resources.clone())?),
            None => Arc::new(UnavailableDataFetch),
        };
        let compute: Arc<dyn Compute> = match &config.compute_url {
            Some(url) => Arc::new(HttpCompute::new(url, resources)?),
            None => Arc::new(BaselineCompute),
        };
        info!(
            "Collaborators: data={}, compute={}",
            data.name(),
            compute.name()
        );
        Ok(Self { data, compute })
    }
}
