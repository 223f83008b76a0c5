//! Bounded-concurrency batch executor.
//!
//! Items are processed in sub-batches of `batch_size`; within a sub-batch
//! every item runs as its own tokio task, but a semaphore shared by all
//! users of the executor caps how many are actually executing. Each task
//! gets `task_timeout` once it holds a permit. Failures are collected next
//! to the successes and never abort the batch. There are no retries here.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{EngineError, ErrorKind, Result};

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Operations allowed in flight at once
    pub max_concurrency: usize,
    /// Items per sub-batch
    pub batch_size: usize,
    /// Deadline for a single task, counted once it holds a permit
    pub task_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            batch_size: 25,
            task_timeout: Duration::from_secs(30),
        }
    }
}

// == Computation Task ==
/// Record of one item's execution within a batch.
#[derive(Debug)]
pub struct ComputationTask<R> {
    pub entity_id: String,
    pub timeout: Duration,
    pub result: Option<R>,
    pub error: Option<EngineError>,
}

impl<R> ComputationTask<R> {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(EngineError::kind)
    }
}

// == Batch Outcome ==
/// Everything a batch produced: successes and failures, in input order.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub tasks: Vec<ComputationTask<R>>,
}

impl<R> BatchOutcome<R> {
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn succeeded(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// succeeded / total; 0.0 for an empty batch.
    pub fn success_ratio(&self) -> f64 {
        if self.tasks.is_empty() {
            0.0
        } else {
            self.succeeded() as f64 / self.total() as f64
        }
    }

    pub fn count_kind(&self, kind: ErrorKind) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.error_kind() == Some(kind))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComputationTask<R>> {
        self.tasks.iter().filter(|t| !t.is_success())
    }

    /// Drops the failure records and keeps the successful results.
    pub fn into_results(self) -> Vec<R> {
        self.tasks.into_iter().filter_map(|t| t.result).collect()
    }
}

// == Executor ==
#[derive(Debug, Clone)]
pub struct BoundedConcurrencyExecutor {
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl BoundedConcurrencyExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let config = ExecutorConfig {
            max_concurrency: config.max_concurrency.max(1),
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    /// Permits not currently held by a running task.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    // == Process Batches ==
    /// Runs `f` over every item and returns one record per item.
    pub async fn process_batches<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> BatchOutcome<R>
    where
        T: Display + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let f = Arc::new(f);
        let timeout = self.config.task_timeout;
        let mut tasks: Vec<ComputationTask<R>> = Vec::with_capacity(items.len());
        let mut items = items.into_iter().peekable();
        let mut batch_no = 0usize;

        while items.peek().is_some() {
            let batch: Vec<T> = items.by_ref().take(self.config.batch_size).collect();
            let offset = tasks.len();
            let mut set = JoinSet::new();

            for (i, item) in batch.into_iter().enumerate() {
                tasks.push(ComputationTask {
                    entity_id: item.to_string(),
                    timeout,
                    result: None,
                    error: Some(EngineError::Internal("task did not report".into())),
                });
                let semaphore = Arc::clone(&self.semaphore);
                let f = Arc::clone(&f);
                set.spawn(async move {
                    let outcome = run_guarded(&semaphore, timeout, f(item)).await;
                    (offset + i, outcome)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, Ok(value))) => {
                        tasks[index].result = Some(value);
                        tasks[index].error = None;
                    }
                    Ok((index, Err(err))) => {
                        debug!("Task {} failed: {}", tasks[index].entity_id, err);
                        tasks[index].error = Some(err);
                    }
                    // Only reachable if the runtime cancels the task; the
                    // record keeps its "did not report" error.
                    Err(join_err) => warn!("Batch task lost: {}", join_err),
                }
            }

            let failed = tasks[offset..].iter().filter(|t| !t.is_success()).count();
            if failed > 0 {
                warn!(
                    "Batch {}: {} of {} tasks failed",
                    batch_no,
                    failed,
                    tasks.len() - offset
                );
            }
            batch_no += 1;
        }

        BatchOutcome { tasks }
    }

    // == Execute Single ==
    /// Runs one future under the same permit and timeout discipline.
    pub async fn execute_single<R, Fut>(&self, label: &str, fut: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        let result = run_guarded(&self.semaphore, self.config.task_timeout, fut).await;
        if let Err(err) = &result {
            debug!("Single task {} failed: {}", label, err);
        }
        result
    }
}

/// Acquires a permit, then runs `fut` under `timeout`, turning a timeout or
/// a panic into an error value.
async fn run_guarded<R, Fut>(semaphore: &Semaphore, timeout: Duration, fut: Fut) -> Result<R>
where
    Fut: Future<Output = Result<R>>,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| EngineError::Internal("executor closed".into()))?;

    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(EngineError::Timeout(format!(
            "task exceeded {}ms",
            timeout.as_millis()
        ))),
        Ok(Err(_panic)) => Err(EngineError::Internal("task panicked".into())),
        Ok(Ok(result)) => result,
    }
}
