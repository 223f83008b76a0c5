//! Cache Warming Task
//!
//! A ticker enqueues popular jobs (active games and tracked entities) onto a
//! bounded queue; a separate consumer loop recomputes them through the
//! engine. Enqueueing never waits, and warming failures only get logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::PropComputationEngine;

#[derive(Debug, Clone)]
pub struct WarmerSettings {
    pub interval: Duration,
    pub max_games: usize,
    pub entities: Vec<String>,
    pub queue_capacity: usize,
}

impl WarmerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.warm_interval_secs.max(1)),
            max_games: config.warm_max_games,
            entities: config.warm_entities.clone(),
            queue_capacity: config.warm_queue_capacity.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmJob {
    /// Recomputes a game's full prop list, which serves every request limit
    Game(String),
    Entity(String),
}

/// Clears the in-progress flag when a cycle ends, including by panic.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CacheWarmer {
    engine: Arc<PropComputationEngine>,
    settings: WarmerSettings,
    warming: AtomicBool,
    jobs: mpsc::Sender<WarmJob>,
}

impl CacheWarmer {
    /// Builds the warmer and the receiving end of its job queue.
    pub fn new(
        engine: Arc<PropComputationEngine>,
        settings: WarmerSettings,
    ) -> (Arc<Self>, mpsc::Receiver<WarmJob>) {
        let (jobs, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let warmer = Arc::new(Self {
            engine,
            settings,
            warming: AtomicBool::new(false),
            jobs,
        });
        (warmer, receiver)
    }

    pub fn is_warming(&self) -> bool {
        self.warming.load(Ordering::Acquire)
    }

    /// Queues a job without waiting. A full or closed queue drops it.
    pub fn enqueue(&self, job: WarmJob) -> bool {
        match self.jobs.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                debug!("Warm queue full, dropping {:?}", job);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                debug!("Warm queue closed, dropping {:?}", job);
                false
            }
        }
    }

    // == Cycle ==
    /// Enqueues this cycle's jobs. Returns how many were queued, or `None`
    /// when another cycle is still in progress.
    pub async fn run_cycle(&self) -> Option<usize> {
        if self
            .warming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Warming cycle already running, skipping");
            return None;
        }
        let _guard = CycleGuard(&self.warming);

        let games = match self.engine.active_games().await {
            Ok(games) => games,
            Err(err) => {
                warn!("Could not fetch active games for warming: {}", err);
                Vec::new()
            }
        };

        let mut queued = 0;
        for game_id in games.into_iter().take(self.settings.max_games) {
            if self.enqueue(WarmJob::Game(game_id)) {
                queued += 1;
            }
        }
        for entity_id in &self.settings.entities {
            if self.enqueue(WarmJob::Entity(entity_id.clone())) {
                queued += 1;
            }
        }

        info!("Warming cycle queued {} jobs", queued);
        Some(queued)
    }

    /// Runs one job through the engine.
    pub async fn process(&self, job: WarmJob) {
        let response = match &job {
            WarmJob::Game(game_id) => self.engine.refresh(game_id).await,
            WarmJob::Entity(entity_id) => self.engine.refresh_entity(entity_id).await,
        };
        if response.is_degraded() {
            debug!("Warm job {:?} degraded", job);
        }
    }

    // == Spawn ==
    /// Starts the ticker and consumer loops as tracked tasks.
    pub fn spawn(self: &Arc<Self>, mut receiver: mpsc::Receiver<WarmJob>) {
        let resources = Arc::clone(self.engine.resources());

        let ticker = Arc::clone(self);
        resources.spawn_tracked("cache_warmer", async move {
            info!(
                "Starting cache warmer with interval of {} seconds",
                ticker.settings.interval.as_secs()
            );
            let mut interval = tokio::time::interval(ticker.settings.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                ticker.run_cycle().await;
            }
        });

        let consumer = Arc::clone(self);
        resources.spawn_tracked("warm_queue_consumer", async move {
            while let Some(job) = receiver.recv().await {
                consumer.process(job).await;
            }
            debug!("Warm queue closed, consumer exiting");
        });
    }
}

/// Builds a warmer from `config` and starts both of its loops.
pub fn spawn_cache_warmer(engine: Arc<PropComputationEngine>, config: &Config) -> Arc<CacheWarmer> {
    let (warmer, receiver) = CacheWarmer::new(engine, WarmerSettings::from_config(config));
    warmer.spawn(receiver);
    warmer
}
