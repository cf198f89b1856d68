//! HTTP router assembly.

use axum::{
    Router,
    extract::Extension,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::gateway::QueryGateway;
use crate::gateway::handlers::{handle_health, handle_query};
use crate::metrics::MetricsCollector;
use crate::metrics::handlers::{handle_metrics, handle_metrics_snapshot, handle_metrics_stream};
use crate::registry::WorkerRegistry;
use crate::registry::handlers::{
    handle_drain_worker, handle_register_worker, handle_remove_worker, handle_workers_status,
};

pub fn build_router(
    gateway: Arc<QueryGateway>,
    registry: Arc<WorkerRegistry>,
    metrics: Arc<MetricsCollector>,
) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/metrics", get(handle_metrics))
        .route("/metrics/snapshot", get(handle_metrics_snapshot))
        .route("/metrics/stream", get(handle_metrics_stream))
        .route("/workers", post(handle_register_worker))
        .route("/workers/status", get(handle_workers_status))
        .route("/workers/:id/drain", post(handle_drain_worker))
        .route("/workers/:id", delete(handle_remove_worker))
        .route("/health", get(handle_health))
        .layer(Extension(gateway))
        .layer(Extension(registry))
        .layer(Extension(metrics))
}
