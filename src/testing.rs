//! Shared test fixtures: an in-process `WorkerClient` and registry helpers.

use crate::error::SubQueryError;
use crate::query::Row;
use crate::registry::types::WorkerHealth;
use crate::registry::{RegistryConfig, Worker, WorkerClient, WorkerRegistry};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Responder = Arc<dyn Fn(&str) -> Result<Vec<Row>, SubQueryError> + Send + Sync>;

/// Scriptable worker pool. Unscripted workers answer every statement with no rows.
#[derive(Default)]
pub struct MockWorkerClient {
    responders: DashMap<String, Responder>,
    delays: DashMap<String, Duration>,
    unhealthy: DashMap<String, ()>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockWorkerClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond<F>(&self, worker: &str, f: F)
    where
        F: Fn(&str) -> Result<Vec<Row>, SubQueryError> + Send + Sync + 'static,
    {
        self.responders.insert(worker.to_string(), Arc::new(f));
    }

    pub fn rows(&self, worker: &str, rows: Vec<Row>) {
        self.respond(worker, move |_| Ok(rows.clone()));
    }

    pub fn fail(&self, worker: &str, error: SubQueryError) {
        self.respond(worker, move |_| Err(error.clone()));
    }

    pub fn delay(&self, worker: &str, delay: Duration) {
        self.delays.insert(worker.to_string(), delay);
    }

    pub fn set_healthy(&self, worker: &str, healthy: bool) {
        if healthy {
            self.unhealthy.remove(worker);
        } else {
            self.unhealthy.insert(worker.to_string(), ());
        }
    }

    /// `(worker, sql)` for every execute call, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, worker: &str) -> usize {
        self.calls.lock().iter().filter(|(w, _)| w == worker).count()
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn execute(&self, worker: &Worker, sql: &str) -> Result<Vec<Row>, SubQueryError> {
        self.calls
            .lock()
            .push((worker.name.clone(), sql.to_string()));

        let delay = self.delays.get(&worker.name).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let responder = self.responders.get(&worker.name).map(|r| r.clone());
        match responder {
            Some(responder) => responder(sql),
            None => Ok(Vec::new()),
        }
    }

    async fn health(&self, worker: &Worker) -> Result<WorkerHealth, SubQueryError> {
        if self.unhealthy.contains_key(&worker.name) {
            return Err(SubQueryError::Transport("connection refused".to_string()));
        }
        Ok(WorkerHealth {
            cpu: Some(0.25),
            memory: Some(0.5),
        })
    }
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Registry with the given workers registered and promoted online.
pub async fn online_registry(
    client: Arc<MockWorkerClient>,
    names: &[&str],
) -> Arc<WorkerRegistry> {
    let registry = WorkerRegistry::new(client, RegistryConfig::default());
    for name in names {
        registry
            .register(name, &format!("http://{}:8001", name))
            .unwrap();
    }
    registry.check_all().await;
    registry
}
