use crate::aggregate::{AggregatedResult, aggregate};
use crate::config::DispatcherConfig;
use crate::dispatch::{CoordinatorConfig, DispatchCoordinator};
use crate::error::DispatchError;
use crate::metrics::MetricsCollector;
use crate::planner::PartitionPlanner;
use crate::query::parse_query;
use crate::registry::{WorkerClient, WorkerRegistry};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entry point for one SQL query: parse, plan, dispatch, merge.
pub struct QueryGateway {
    registry: Arc<WorkerRegistry>,
    planner: PartitionPlanner,
    coordinator: DispatchCoordinator,
    metrics: Arc<MetricsCollector>,
    split_column: String,
    request_deadline: Duration,
}

impl QueryGateway {
    pub fn new(
        client: Arc<dyn WorkerClient>,
        registry: Arc<WorkerRegistry>,
        metrics: Arc<MetricsCollector>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            coordinator: DispatchCoordinator::new(
                client,
                registry.clone(),
                metrics.clone(),
                CoordinatorConfig::from(config),
            ),
            planner: PartitionPlanner::new(config.max_partitions),
            registry,
            metrics,
            split_column: config.split_column.clone(),
            request_deadline: config.request_deadline,
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<AggregatedResult, DispatchError> {
        let query_id = Uuid::new_v4();
        let started = Instant::now();
        self.metrics.record_request();

        let result = self.run(query_id, sql, started).await;

        self.metrics.record_latency(started.elapsed());
        match &result {
            Ok(merged) => info!(
                "Query {} finished: status={:?} rows={} partitions={}/{} in {:?}",
                query_id,
                merged.status,
                merged.rows.len(),
                merged.total_partitions - merged.failed_partitions,
                merged.total_partitions,
                merged.elapsed
            ),
            Err(e) => {
                self.metrics.record_failure();
                if e.is_client_error() {
                    info!("Query {} rejected: {}", query_id, e);
                } else {
                    warn!("Query {} failed: {}", query_id, e);
                }
            }
        }
        self.metrics.publish();

        result
    }

    async fn run(
        &self,
        query_id: Uuid,
        sql: &str,
        started: Instant,
    ) -> Result<AggregatedResult, DispatchError> {
        let query = match parse_query(sql, &self.split_column) {
            Ok(query) => query,
            Err(e) => {
                self.metrics.record_kind("invalid");
                return Err(e);
            }
        };
        self.metrics.record_kind(query.kind.label());

        // One snapshot for the whole plan.
        let workers = self.registry.list_active();
        let plan = self.planner.plan(query_id, &query, &workers)?;
        self.metrics.record_plan(plan.sub_queries.len());

        debug!(
            "Query {} ({}) planned as {:?} over {} sub-queries",
            query_id,
            query.kind.label(),
            plan.strategy,
            plan.sub_queries.len()
        );

        let deadline = started + self.request_deadline;
        let partials = self.coordinator.dispatch(&plan, deadline).await?;

        aggregate(&query, partials, started.elapsed())
    }
}
