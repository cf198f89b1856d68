use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{RegisterWorkerRequest, WorkerActionResponse, WorkersStatusResponse};
use super::service::WorkerRegistry;
use super::types::{RegistryError, WorkerId};

pub async fn handle_workers_status(
    Extension(registry): Extension<Arc<WorkerRegistry>>,
) -> (StatusCode, Json<WorkersStatusResponse>) {
    (StatusCode::OK, Json(registry.status()))
}

pub async fn handle_register_worker(
    Extension(registry): Extension<Arc<WorkerRegistry>>,
    Json(req): Json<RegisterWorkerRequest>,
) -> (StatusCode, Json<WorkerActionResponse>) {
    match registry.register(&req.name, &req.endpoint) {
        Ok(worker) => (
            StatusCode::CREATED,
            Json(WorkerActionResponse {
                success: true,
                message: Some(format!("worker {} registered", worker.id)),
            }),
        ),
        Err(e) => error_response(e),
    }
}

pub async fn handle_drain_worker(
    Extension(registry): Extension<Arc<WorkerRegistry>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<WorkerActionResponse>) {
    match registry.drain(&WorkerId::new(id)) {
        Ok(worker) => (
            StatusCode::OK,
            Json(WorkerActionResponse {
                success: true,
                message: Some(format!("worker {} is draining", worker.id)),
            }),
        ),
        Err(e) => error_response(e),
    }
}

pub async fn handle_remove_worker(
    Extension(registry): Extension<Arc<WorkerRegistry>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<WorkerActionResponse>) {
    match registry.remove(&WorkerId::new(id)) {
        Ok(worker) => (
            StatusCode::OK,
            Json(WorkerActionResponse {
                success: true,
                message: Some(format!("worker {} removed", worker.id)),
            }),
        ),
        Err(e) => error_response(e),
    }
}

fn error_response(e: RegistryError) -> (StatusCode, Json<WorkerActionResponse>) {
    tracing::warn!("Worker management request failed: {}", e);
    let status = match e {
        RegistryError::Duplicate(_) => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Invalid(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(WorkerActionResponse {
            success: false,
            message: Some(e.to_string()),
        }),
    )
}
