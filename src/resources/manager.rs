//! Resource manager: lazily built connection pools plus tracked tasks.
//!
//! Clients are created on first use for a dependency class and shared after
//! that (`reqwest::Client` is a cheap handle over one pool). `shutdown`
//! aborts every tracked task, waits for it to stop and drops all pools.
//! A later `with_connection` builds a fresh pool.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Pool shape applied to every dependency client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 30,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    pub reaped_tasks: usize,
    pub live_tasks: usize,
    pub pools: usize,
}

struct TrackedTask {
    name: String,
    handle: JoinHandle<()>,
}

pub struct ResourceManager {
    pool: PoolConfig,
    clients: Mutex<HashMap<String, reqwest::Client>>,
    tasks: Mutex<Vec<TrackedTask>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResourceManager {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            pool,
            clients: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }

    // == Connections ==
    /// Returns the pooled client for `dependency`, building it on first use.
    pub fn with_connection(&self, dependency: &str) -> Result<reqwest::Client> {
        let mut clients = lock(&self.clients);
        if let Some(client) = clients.get(dependency) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(self.pool.max_idle_per_host)
            .pool_idle_timeout(self.pool.idle_timeout)
            .tcp_keepalive(self.pool.tcp_keepalive)
            .connect_timeout(self.pool.connect_timeout)
            .timeout(self.pool.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                EngineError::Internal(format!("failed to build client for {}: {}", dependency, e))
            })?;

        debug!("Created connection pool for {}", dependency);
        clients.insert(dependency.to_string(), client.clone());
        Ok(client)
    }

    pub fn pool_count(&self) -> usize {
        lock(&self.clients).len()
    }

    // == Tasks ==
    /// Spawns `fut` and records it so shutdown can cancel it.
    pub fn spawn_tracked<F>(&self, name: &str, fut: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let abort = handle.abort_handle();
        lock(&self.tasks).push(TrackedTask {
            name: name.to_string(),
            handle,
        });
        debug!("Tracking background task {}", name);
        abort
    }

    /// Names of tracked tasks that have not yet finished.
    pub fn tracked_tasks(&self) -> Vec<String> {
        lock(&self.tasks)
            .iter()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Drops registry entries for finished tasks.
    pub fn reap_finished(&self) -> usize {
        let mut tasks = lock(&self.tasks);
        let before = tasks.len();
        tasks.retain(|t| !t.handle.is_finished());
        if tasks.capacity() > tasks.len().saturating_mul(4).max(8) {
            tasks.shrink_to_fit();
        }
        before - tasks.len()
    }

    /// Reaps finished tasks and reports what is still held.
    pub fn housekeeping(&self) -> HousekeepingReport {
        let reaped_tasks = self.reap_finished();
        HousekeepingReport {
            reaped_tasks,
            live_tasks: lock(&self.tasks).len(),
            pools: self.pool_count(),
        }
    }

    // == Shutdown ==
    /// Cancels every tracked task, waits for each to stop and drops all
    /// pools. Safe to call more than once.
    pub async fn shutdown(&self) {
        let tasks: Vec<TrackedTask> = std::mem::take(&mut *lock(&self.tasks));
        let count = tasks.len();

        for task in &tasks {
            task.handle.abort();
        }
        for task in tasks {
            match task.handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Task {} ended abnormally: {}", task.name, e),
            }
        }

        let pools = std::mem::take(&mut *lock(&self.clients)).len();
        if count > 0 || pools > 0 {
            info!(
                "Resources released: {} tasks cancelled, {} pools closed",
                count, pools
            );
        }
    }
}
