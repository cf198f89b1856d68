use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Stable worker identity. Workers are ordered by id, which keeps planning deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Registered but not yet confirmed by a health check.
    Probationary,
    Online,
    /// Failed too many consecutive checks. Still probed, returns on success.
    Offline,
    /// Listed but excluded from new plans.
    Draining,
}

impl WorkerStatus {
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, WorkerStatus::Online)
    }
}

/// A single worker node as seen by the registry.
///
/// Only the registry mutates these; everyone else works on clones taken from a
/// published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    /// Base url, without trailing slash.
    pub endpoint: String,
    pub status: WorkerStatus,
    pub consecutive_failures: u32,
    pub last_seen_ms: Option<u64>,
    /// Last cpu/memory utilisation reported by the worker's health endpoint.
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub registered_at_ms: u64,
}

impl Worker {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: WorkerId::new(name.clone()),
            name,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            status: WorkerStatus::Probationary,
            consecutive_failures: 0,
            last_seen_ms: None,
            cpu: None,
            memory: None,
            registered_at_ms: now_ms(),
        }
    }
}

/// Immutable view of the registry, published by pointer swap after every change.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub version: u64,
    /// All known workers, ascending by id.
    pub workers: Vec<Worker>,
}

impl RegistrySnapshot {
    pub fn active(&self) -> Vec<Worker> {
        self.workers
            .iter()
            .filter(|w| w.status.is_dispatchable())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| &w.id == id)
    }
}

/// Utilisation figures reported by a healthy worker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkerHealth {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("worker '{0}' is already registered")]
    Duplicate(String),

    #[error("worker '{0}' not found")]
    NotFound(String),

    #[error("invalid worker: {0}")]
    Invalid(String),
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
