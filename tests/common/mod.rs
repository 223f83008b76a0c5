//! Scripted collaborators and recording tiers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prop_engine::cache::{CacheBackend, InMemoryBackend, PerformanceMetrics, TieredCache};
use prop_engine::engine::{
    BaselineCompute, Collaborators, Compute, DataFetch, EntityData, PredictionContext,
    PropComputationEngine,
};
use prop_engine::error::{EngineError, Result};
use prop_engine::models::PropResult;
use prop_engine::resources::{PoolConfig, ResourceManager};
use prop_engine::Config;

// == Scripted Data Source ==
/// How the scripted data source answers for one entity.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Returns data with this baseline confidence
    Confidence(f64),
    /// Sleeps before answering with confidence 0.5
    Slow(Duration),
    /// Fails with a network error
    Fail,
    /// Panics inside the task
    Panic,
}

pub struct ScriptedData {
    games: HashMap<String, Vec<String>>,
    behaviors: HashMap<String, Behavior>,
    list_fails: bool,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedData {
    pub fn new() -> Self {
        Self {
            games: HashMap::new(),
            behaviors: HashMap::new(),
            list_fails: false,
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Adds a game whose entities behave as given, in order.
    pub fn game<S: Into<String>>(mut self, game_id: &str, entities: Vec<(S, Behavior)>) -> Self {
        let mut ids = Vec::with_capacity(entities.len());
        for (id, behavior) in entities {
            let id = id.into();
            self.behaviors.insert(id.clone(), behavior);
            ids.push(id);
        }
        self.games.insert(game_id.to_string(), ids);
        self
    }

    /// Makes every entity listing fail with a network error.
    pub fn failing(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn entity(entity_id: &str, confidence: f64) -> EntityData {
    EntityData {
        entity_id: entity_id.to_string(),
        baseline_confidence: confidence,
        baseline_value: 1.5,
        stats: HashMap::new(),
    }
}

#[async_trait]
impl DataFetch for ScriptedData {
    fn name(&self) -> &str {
        "scripted_data"
    }

    async fn game_entities(&self, game_id: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_fails {
            return Err(EngineError::Network("connection refused".into()));
        }
        if game_id == "PANIC" {
            panic!("scripted listing failure");
        }
        Ok(self.games.get(game_id).cloned().unwrap_or_default())
    }

    async fn fetch_entity_data(&self, entity_id: &str) -> Result<EntityData> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviors.get(entity_id).cloned() {
            Some(Behavior::Confidence(c)) => Ok(entity(entity_id, c)),
            Some(Behavior::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(entity(entity_id, 0.5))
            }
            Some(Behavior::Fail) => Err(EngineError::Network("upstream 503".into())),
            Some(Behavior::Panic) => panic!("scripted entity failure"),
            None => Ok(entity(entity_id, 0.5)),
        }
    }

    async fn active_games(&self) -> Result<Vec<String>> {
        let mut games: Vec<String> = self.games.keys().cloned().collect();
        games.sort();
        Ok(games)
    }
}

// == Scripted Compute ==
pub struct ScriptedCompute {
    /// `Some((confidence, uncertainty))` to answer, `None` to fail
    answer: Option<(f64, f64)>,
    pub calls: AtomicUsize,
}

impl ScriptedCompute {
    pub fn answering(confidence: f64, uncertainty: f64) -> Self {
        Self {
            answer: Some((confidence, uncertainty)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compute for ScriptedCompute {
    fn name(&self) -> &str {
        "scripted_compute"
    }

    async fn predict(&self, data: &EntityData, _ctx: &PredictionContext) -> Result<PropResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some((confidence, uncertainty)) => Ok(PropResult::new(
                data.entity_id.clone(),
                confidence,
                uncertainty,
                2.5,
            )),
            None => Err(EngineError::Network("model server down".into())),
        }
    }
}

// == Recording Backend ==
/// In-memory tier that remembers the TTL of every write.
pub struct RecordingBackend {
    inner: InMemoryBackend,
    writes: Mutex<Vec<(String, u64)>>,
}

impl RecordingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            inner: InMemoryBackend::new(name, 1000),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn writes(&self) -> Vec<(String, u64)> {
        self.writes.lock().unwrap().clone()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.contains(key).await
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.writes()
            .into_iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, ttl)| ttl)
    }
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        self.writes.lock().unwrap().push((key.to_string(), ttl_secs));
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

// == Harness ==
pub struct Harness {
    pub engine: Arc<PropComputationEngine>,
    pub data: Arc<ScriptedData>,
    pub distributed: Arc<RecordingBackend>,
    pub durable: Arc<RecordingBackend>,
}

pub fn harness(config: Config, data: ScriptedData, compute: Arc<dyn Compute>) -> Harness {
    let data = Arc::new(data);
    let distributed = Arc::new(RecordingBackend::new("distributed"));
    let durable = Arc::new(RecordingBackend::new("durable"));
    let cache = Arc::new(TieredCache::new(
        config.memory_max_entries,
        distributed.clone(),
        durable.clone(),
        config.tier_ttls(),
        Arc::new(PerformanceMetrics::new()),
    ));
    let engine = Arc::new(PropComputationEngine::new(
        &config,
        cache,
        Collaborators::new(data.clone(), compute),
        Arc::new(ResourceManager::new(PoolConfig::default())),
    ));
    Harness {
        engine,
        data,
        distributed,
        durable,
    }
}

pub fn baseline_harness(config: Config, data: ScriptedData) -> Harness {
    harness(config, data, Arc::new(BaselineCompute))
}

/// `n` entities named `{prefix}{i}` with descending confidences.
pub fn entities(prefix: &str, n: usize) -> Vec<(String, Behavior)> {
    (0..n)
        .map(|i| {
            (
                format!("{}{}", prefix, i),
                Behavior::Confidence(0.9 - i as f64 * 0.01),
            )
        })
        .collect()
}
