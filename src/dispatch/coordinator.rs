use super::types::{PartialResult, PartialStatus};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, SubQueryError};
use crate::metrics::MetricsCollector;
use crate::planner::{PartitionPlan, SubQuery};
use crate::query::Row;
use crate::registry::{WorkerClient, WorkerRegistry};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

/// First attempt plus one retry.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub sub_query_timeout: Duration,
    pub retry_backoff: Duration,
    pub max_in_flight: usize,
}

impl From<&DispatcherConfig> for CoordinatorConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            sub_query_timeout: config.sub_query_timeout,
            retry_backoff: config.retry_backoff,
            max_in_flight: config.max_in_flight,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

pub struct DispatchCoordinator {
    client: Arc<dyn WorkerClient>,
    registry: Arc<WorkerRegistry>,
    metrics: Arc<MetricsCollector>,
    /// Process-wide bound on concurrent worker calls.
    permits: Arc<Semaphore>,
    config: CoordinatorConfig,
}

impl DispatchCoordinator {
    pub fn new(
        client: Arc<dyn WorkerClient>,
        registry: Arc<WorkerRegistry>,
        metrics: Arc<MetricsCollector>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            client,
            registry,
            metrics,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs every sub-query of the plan concurrently and returns one partial result per
    /// sub-query, ordered by sub-query id. Sub-queries still running at `deadline` are
    /// aborted and reported as cancelled.
    pub async fn dispatch(
        &self,
        plan: &PartitionPlan,
        deadline: Instant,
    ) -> Result<Vec<PartialResult>, DispatchError> {
        let started = Instant::now();
        let total = plan.sub_queries.len();

        let mut tasks = JoinSet::new();
        for sub_query in &plan.sub_queries {
            let task = SubQueryTask {
                query_id: plan.query_id,
                sub_query: sub_query.clone(),
                client: self.client.clone(),
                registry: self.registry.clone(),
                metrics: self.metrics.clone(),
                permits: self.permits.clone(),
                config: self.config.clone(),
            };
            tasks.spawn(task.run());
        }

        let mut slots: Vec<Option<PartialResult>> = vec![None; total];
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(partial))) => {
                    let id = partial.sub_query_id;
                    if let Some(slot) = slots.get_mut(id) {
                        *slot = Some(partial);
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("[{}] Sub-query task failed: {}", plan.query_id, e);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    tracing::warn!(
                        "[{}] Deadline reached with {} sub-queries outstanding",
                        plan.query_id,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let results: Vec<PartialResult> = slots
            .into_iter()
            .zip(&plan.sub_queries)
            .map(|(slot, sub_query)| {
                slot.unwrap_or_else(|| {
                    let (status, error) = if deadline_hit {
                        (PartialStatus::Cancelled, "request deadline exceeded")
                    } else {
                        (PartialStatus::Error, "sub-query task aborted")
                    };
                    let mut partial = PartialResult::failed(
                        sub_query.worker.id.clone(),
                        sub_query.id,
                        status,
                        error,
                    );
                    partial.attempts = 0;
                    partial.elapsed = started.elapsed();
                    partial
                })
            })
            .collect();

        if !results.is_empty() && results.iter().all(|r| !r.is_ok()) {
            let last_error = results
                .iter()
                .rev()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(DispatchError::AllWorkersFailed {
                attempted: total,
                last_error,
            });
        }

        Ok(results)
    }
}

struct SubQueryTask {
    query_id: Uuid,
    sub_query: SubQuery,
    client: Arc<dyn WorkerClient>,
    registry: Arc<WorkerRegistry>,
    metrics: Arc<MetricsCollector>,
    permits: Arc<Semaphore>,
    config: CoordinatorConfig,
}

impl SubQueryTask {
    async fn run(self) -> PartialResult {
        let started = Instant::now();
        let worker = &self.sub_query.worker;

        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return PartialResult::failed(
                    worker.id.clone(),
                    self.sub_query.id,
                    PartialStatus::Error,
                    e.to_string(),
                );
            }
        };
        let in_flight = self.registry.begin_dispatch(&worker.id);

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self.attempt().await {
                Ok(rows) => break Ok(rows),
                Err(e) if e.is_retryable() && attempts < MAX_ATTEMPTS => {
                    tracing::debug!(
                        "[{}] Sub-query {} on {} failed ({}), retrying",
                        self.query_id,
                        self.sub_query.id,
                        worker.id,
                        e
                    );
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(self.config.retry_backoff + Duration::from_millis(jitter))
                        .await;
                }
                Err(e) => break Err(e),
            }
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(rows) => {
                in_flight.complete();
                self.registry.report_outcome(&worker.id, true);
                self.metrics.record_sub_query(&worker.id, true, elapsed);

                tracing::debug!(
                    "[{}] Sub-query {} on {}: {} rows in {:?}",
                    self.query_id,
                    self.sub_query.id,
                    worker.id,
                    rows.len(),
                    elapsed
                );

                let mut partial = PartialResult::ok(worker.id.clone(), self.sub_query.id, rows);
                partial.attempts = attempts;
                partial.elapsed = elapsed;
                partial
            }
            Err(e) => {
                drop(in_flight);
                // A worker that answered is reachable, whatever it answered.
                self.registry
                    .report_outcome(&worker.id, !e.is_health_failure());
                self.metrics.record_sub_query(&worker.id, false, elapsed);

                tracing::warn!(
                    "[{}] Sub-query {} on {} failed after {} attempt(s): {}",
                    self.query_id,
                    self.sub_query.id,
                    worker.id,
                    attempts,
                    e
                );

                let status = match e {
                    SubQueryError::Timeout(_) => PartialStatus::Timeout,
                    _ => PartialStatus::Error,
                };
                let mut partial =
                    PartialResult::failed(worker.id.clone(), self.sub_query.id, status, e.to_string());
                partial.attempts = attempts;
                partial.elapsed = elapsed;
                partial
            }
        }
    }

    async fn attempt(&self) -> Result<Vec<Row>, SubQueryError> {
        let timeout = self.config.sub_query_timeout;
        match tokio::time::timeout(
            timeout,
            self.client.execute(&self.sub_query.worker, &self.sub_query.sql),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SubQueryError::Timeout(timeout)),
        }
    }
}
