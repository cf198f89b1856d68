use super::client::WorkerClient;
use super::protocol::{WorkerStatusEntry, WorkersStatusResponse};
use super::types::{
    RegistryError, RegistrySnapshot, Worker, WorkerHealth, WorkerId, WorkerStatus, now_ms,
};
use crate::config::DispatcherConfig;
use crate::error::SubQueryError;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub failure_threshold: u32,
    pub health_interval: Duration,
    pub health_timeout: Duration,
}

impl From<&DispatcherConfig> for RegistryConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            health_interval: config.health_interval,
            health_timeout: config.health_timeout,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

/// Per-worker load counters, kept outside the snapshot so dispatching never republishes.
#[derive(Debug, Default)]
pub struct WorkerLoad {
    in_flight: AtomicUsize,
    completed: AtomicU64,
}

/// Tracks one in-flight sub-query. Dropping the guard ends the dispatch, so cancelled
/// tasks release their slot too.
pub struct InFlightGuard {
    load: Arc<WorkerLoad>,
}

impl InFlightGuard {
    /// Ends the dispatch and counts it as a completed request.
    pub fn complete(self) {
        self.load.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.load.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct WorkerRegistry {
    workers: DashMap<WorkerId, Worker>,
    load: DashMap<WorkerId, Arc<WorkerLoad>>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    publish_lock: Mutex<()>,
    client: Arc<dyn WorkerClient>,
    config: RegistryConfig,
}

impl WorkerRegistry {
    pub fn new(client: Arc<dyn WorkerClient>, config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            workers: DashMap::new(),
            load: DashMap::new(),
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            publish_lock: Mutex::new(()),
            client,
            config,
        })
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!(
            "Starting health checks every {:?} (threshold {})",
            self.config.health_interval,
            self.config.failure_threshold
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.health_check_loop().await;
        });
    }

    /// Current published view. Never waits on health-check I/O.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Dispatchable workers, ascending by id.
    pub fn list_active(&self) -> Vec<Worker> {
        self.snapshot().active()
    }

    pub fn register(&self, name: &str, endpoint: &str) -> Result<Worker, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::Invalid("name is empty".to_string()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(RegistryError::Invalid(format!(
                "endpoint must be an http(s) url, got '{}'",
                endpoint
            )));
        }

        let worker = Worker::new(name, endpoint);
        match self.workers.entry(worker.id.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::Duplicate(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(worker.clone());
            }
        }
        self.load.entry(worker.id.clone()).or_default();

        info!(
            "Registered worker {} at {} (probationary)",
            worker.id, worker.endpoint
        );
        self.publish();
        Ok(worker)
    }

    pub fn remove(&self, id: &WorkerId) -> Result<Worker, RegistryError> {
        let (_, worker) = self
            .workers
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.load.remove(id);

        info!("Removed worker {}", id);
        self.publish();
        Ok(worker)
    }

    pub fn drain(&self, id: &WorkerId) -> Result<Worker, RegistryError> {
        let drained = {
            let mut worker = self
                .workers
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            worker.status = WorkerStatus::Draining;
            worker.clone()
        };

        info!("Worker {} is draining", id);
        self.publish();
        Ok(drained)
    }

    /// Records the result of a dispatch against a worker. The snapshot is only
    /// republished when the failure count or status changed.
    pub fn report_outcome(&self, id: &WorkerId, success: bool) {
        let (republish, went_offline) = match self.workers.get_mut(id) {
            Some(mut worker) => {
                if success {
                    worker.last_seen_ms = Some(now_ms());
                    let had_failures = worker.consecutive_failures > 0;
                    worker.consecutive_failures = 0;
                    (had_failures, false)
                } else {
                    let offline = self.register_failure(&mut worker);
                    (true, offline)
                }
            }
            None => return,
        };

        if went_offline {
            tracing::warn!("Worker {} marked offline after failed dispatches", id);
        }
        if republish {
            self.publish();
        }
    }

    /// Applies one health-check result.
    pub fn record_health(&self, id: &WorkerId, result: Result<WorkerHealth, SubQueryError>) {
        {
            let Some(mut worker) = self.workers.get_mut(id) else {
                return;
            };

            match result {
                Ok(health) => {
                    worker.consecutive_failures = 0;
                    worker.last_seen_ms = Some(now_ms());
                    worker.cpu = health.cpu.or(worker.cpu);
                    worker.memory = health.memory.or(worker.memory);

                    if matches!(
                        worker.status,
                        WorkerStatus::Probationary | WorkerStatus::Offline
                    ) {
                        info!("Worker {} is online", worker.id);
                        worker.status = WorkerStatus::Online;
                    }
                }
                Err(e) => {
                    tracing::debug!("Health check failed for {}: {}", worker.id, e);
                    if self.register_failure(&mut worker) {
                        tracing::warn!(
                            "Worker {} marked offline ({} consecutive failures)",
                            worker.id,
                            worker.consecutive_failures
                        );
                    }
                }
            }
        }

        self.publish();
    }

    /// Returns true when this failure took the worker offline.
    fn register_failure(&self, worker: &mut Worker) -> bool {
        worker.consecutive_failures = worker.consecutive_failures.saturating_add(1);
        if worker.status == WorkerStatus::Online
            && worker.consecutive_failures >= self.config.failure_threshold
        {
            worker.status = WorkerStatus::Offline;
            return true;
        }
        false
    }

    pub fn begin_dispatch(&self, id: &WorkerId) -> InFlightGuard {
        let load = self.load.entry(id.clone()).or_default().clone();
        load.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { load }
    }

    pub fn in_flight(&self, id: &WorkerId) -> usize {
        self.load
            .get(id)
            .map(|l| l.in_flight.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn completed(&self, id: &WorkerId) -> u64 {
        self.load
            .get(id)
            .map(|l| l.completed.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn status(&self) -> WorkersStatusResponse {
        let snapshot = self.snapshot();
        let workers: Vec<WorkerStatusEntry> = snapshot
            .workers
            .iter()
            .map(|w| WorkerStatusEntry {
                id: w.id.to_string(),
                name: w.name.clone(),
                endpoint: w.endpoint.clone(),
                status: w.status,
                cpu: w.cpu,
                memory: w.memory,
                requests: self.completed(&w.id),
                in_flight: self.in_flight(&w.id),
                consecutive_failures: w.consecutive_failures,
                last_seen_ms: w.last_seen_ms,
            })
            .collect();

        let online_workers = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Online)
            .count();

        WorkersStatusResponse {
            total_workers: workers.len(),
            online_workers,
            workers,
            timestamp: now_ms(),
        }
    }

    /// Probes every known worker concurrently and applies the results.
    pub async fn check_all(&self) {
        let workers = self.snapshot().workers.clone();
        if workers.is_empty() {
            return;
        }

        let timeout = self.config.health_timeout;
        let probes = workers.iter().map(|worker| async move {
            let result = match tokio::time::timeout(timeout, self.client.health(worker)).await {
                Ok(result) => result,
                Err(_) => Err(SubQueryError::Timeout(timeout)),
            };
            (worker.id.clone(), result)
        });

        for (id, result) in futures::future::join_all(probes).await {
            self.record_health(&id, result);
        }
    }

    async fn health_check_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.health_interval);

        loop {
            interval.tick().await;
            self.check_all().await;
        }
    }

    fn publish(&self) {
        let _guard = self.publish_lock.lock();

        let mut workers: Vec<Worker> = self
            .workers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));

        let version = self.snapshot.read().version + 1;
        *self.snapshot.write() = Arc::new(RegistrySnapshot { version, workers });
    }
}
