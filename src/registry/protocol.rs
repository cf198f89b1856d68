//! Worker Network Protocol
//!
//! Endpoints and DTOs for talking to workers (`/execute`, `/health`) and for the
//! worker management API served by the dispatcher.

use super::types::WorkerStatus;
use crate::query::Row;
use serde::{Deserialize, Serialize};

// --- Worker Endpoints ---

/// Runs one SQL statement on the worker's engine.
pub const ENDPOINT_EXECUTE: &str = "/execute";
/// Liveness probe; may carry utilisation figures.
pub const ENDPOINT_HEALTH: &str = "/health";

/// Statement used to probe workers that do not expose a health endpoint.
pub const PROBE_SQL: &str = "SELECT 1";

// --- Worker DTOs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
}

/// Result set returned by a worker. An empty result may come back as `null`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
}

// --- Management API DTOs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusEntry {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub status: WorkerStatus,
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    /// Sub-queries completed by this worker since start-up.
    pub requests: u64,
    pub in_flight: usize,
    pub consecutive_failures: u32,
    pub last_seen_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersStatusResponse {
    pub workers: Vec<WorkerStatusEntry>,
    #[serde(rename = "totalWorkers")]
    pub total_workers: usize,
    #[serde(rename = "onlineWorkers")]
    pub online_workers: usize,
    pub timestamp: u64,
}
