use crate::registry::WorkerId;
use crate::registry::types::now_ms;

use dashmap::DashMap;
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub const REQUESTS_TOTAL: &str = "dispatcher_requests_total";
pub const REQUESTS_FAILED: &str = "dispatcher_requests_failed_total";
pub const REQUESTS_BY_KIND: &str = "dispatcher_requests_by_kind_total";
pub const WORKER_REQUESTS_TOTAL: &str = "dispatcher_worker_requests_total";
pub const WORKER_SUB_QUERIES: &str = "dispatcher_worker_sub_queries_total";
pub const WORKER_FAILURES: &str = "dispatcher_worker_failures_total";
pub const WORKER_LATENCY: &str = "dispatcher_worker_latency_seconds";
pub const DYNAMIC_SPLITS: &str = "dispatcher_dynamic_splits_total";
pub const SUB_QUERIES_TOTAL: &str = "dispatcher_sub_queries_total";
pub const REQUEST_LATENCY: &str = "dispatcher_request_latency_seconds";
pub const UPTIME: &str = "dispatcher_uptime_seconds";

#[derive(Debug, Clone, Copy, Default)]
struct WorkerCounters {
    requests: u64,
    failures: u64,
    latency_us: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub requests: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub requests_by_kind: BTreeMap<String, u64>,
    pub worker_requests_total: u64,
    pub workers: BTreeMap<String, WorkerMetrics>,
    pub dynamic_splits: u64,
    pub sub_queries: u64,
    pub avg_latency_ms: f64,
    pub uptime_secs: u64,
    pub timestamp: u64,
}

/// Process-wide counters. All zero at start, only ever incremented.
///
/// Every event goes to a Prometheus recorder owned by the collector (exported on
/// `/metrics`) and to the atomics behind the JSON snapshot and the event stream.
pub struct MetricsCollector {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    started_at: Instant,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    requests_by_kind: DashMap<String, u64>,
    worker_requests_total: AtomicU64,
    workers: DashMap<WorkerId, WorkerCounters>,
    dynamic_splits: AtomicU64,
    sub_queries: AtomicU64,
    latency_us_sum: AtomicU64,
    latency_count: AtomicU64,
    updates: watch::Sender<MetricsSnapshot>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(MetricsSnapshot::default());
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        describe(&recorder);

        Self {
            recorder,
            handle,
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_by_kind: DashMap::new(),
            worker_requests_total: AtomicU64::new(0),
            workers: DashMap::new(),
            dynamic_splits: AtomicU64::new(0),
            sub_queries: AtomicU64::new(0),
            latency_us_sum: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            updates,
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.with_recorder(|| metrics::counter!(REQUESTS_TOTAL).increment(1));
    }

    pub fn record_kind(&self, kind: &str) {
        *self.requests_by_kind.entry(kind.to_string()).or_insert(0) += 1;
        self.with_recorder(|| {
            metrics::counter!(REQUESTS_BY_KIND, "kind" => kind.to_string()).increment(1)
        });
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.with_recorder(|| metrics::counter!(REQUESTS_FAILED).increment(1));
    }

    /// Counts a plan; plans with more than one sub-query are dynamic splits.
    pub fn record_plan(&self, sub_queries: usize) {
        self.sub_queries
            .fetch_add(sub_queries as u64, Ordering::Relaxed);
        if sub_queries > 1 {
            self.dynamic_splits.fetch_add(1, Ordering::Relaxed);
        }

        self.with_recorder(|| {
            metrics::counter!(SUB_QUERIES_TOTAL).increment(sub_queries as u64);
            if sub_queries > 1 {
                metrics::counter!(DYNAMIC_SPLITS).increment(1);
            }
        });
    }

    pub fn record_sub_query(&self, worker: &WorkerId, success: bool, elapsed: Duration) {
        self.worker_requests_total.fetch_add(1, Ordering::Relaxed);

        {
            let mut counters = self.workers.entry(worker.clone()).or_default();
            counters.requests += 1;
            counters.latency_us += elapsed.as_micros() as u64;
            if !success {
                counters.failures += 1;
            }
        }

        self.with_recorder(|| {
            metrics::counter!(WORKER_REQUESTS_TOTAL).increment(1);
            metrics::counter!(WORKER_SUB_QUERIES, "worker" => worker.to_string()).increment(1);
            if !success {
                metrics::counter!(WORKER_FAILURES, "worker" => worker.to_string()).increment(1);
            }
            metrics::histogram!(WORKER_LATENCY, "worker" => worker.to_string())
                .record(elapsed.as_secs_f64());
        });
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_us_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.with_recorder(|| metrics::histogram!(REQUEST_LATENCY).record(elapsed.as_secs_f64()));
    }

    /// Pushes the current snapshot to stream subscribers.
    pub fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.updates.subscribe()
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn dynamic_splits(&self) -> u64 {
        self.dynamic_splits.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let workers = self
            .workers
            .iter()
            .map(|entry| {
                let c = entry.value();
                let avg_latency_ms = if c.requests == 0 {
                    0.0
                } else {
                    c.latency_us as f64 / c.requests as f64 / 1000.0
                };
                (
                    entry.key().to_string(),
                    WorkerMetrics {
                        requests: c.requests,
                        failures: c.failures,
                        avg_latency_ms,
                    },
                )
            })
            .collect();

        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let avg_latency_ms = if latency_count == 0 {
            0.0
        } else {
            self.latency_us_sum.load(Ordering::Relaxed) as f64 / latency_count as f64 / 1000.0
        };

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_by_kind: self
                .requests_by_kind
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            worker_requests_total: self.worker_requests_total.load(Ordering::Relaxed),
            workers,
            dynamic_splits: self.dynamic_splits.load(Ordering::Relaxed),
            sub_queries: self.sub_queries.load(Ordering::Relaxed),
            avg_latency_ms,
            uptime_secs: self.started_at.elapsed().as_secs(),
            timestamp: now_ms(),
        }
    }

    /// Prometheus text exposition format, rendered by the exporter's handle.
    pub fn render_prometheus(&self) -> String {
        self.with_recorder(|| {
            metrics::gauge!(UPTIME).set(self.started_at.elapsed().as_secs_f64());
        });
        self.handle.render()
    }

    fn with_recorder<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }
}

/// Registers the unlabelled series up front so they are exported from zero.
fn describe(recorder: &PrometheusRecorder) {
    metrics::with_local_recorder(recorder, || {
        metrics::describe_counter!(REQUESTS_TOTAL, "Queries received by the gateway.");
        metrics::describe_counter!(REQUESTS_FAILED, "Queries that ended in an error.");
        metrics::describe_counter!(REQUESTS_BY_KIND, "Queries received, by operation kind.");
        metrics::describe_counter!(WORKER_REQUESTS_TOTAL, "Sub-queries sent to workers.");
        metrics::describe_counter!(WORKER_SUB_QUERIES, "Sub-queries sent, by worker.");
        metrics::describe_counter!(WORKER_FAILURES, "Failed sub-queries, by worker.");
        metrics::describe_histogram!(
            WORKER_LATENCY,
            Unit::Seconds,
            "Sub-query latency, by worker."
        );
        metrics::describe_counter!(
            DYNAMIC_SPLITS,
            "Queries fanned out to more than one sub-query."
        );
        metrics::describe_counter!(SUB_QUERIES_TOTAL, "Sub-queries planned.");
        metrics::describe_histogram!(REQUEST_LATENCY, Unit::Seconds, "End-to-end query latency.");
        metrics::describe_gauge!(UPTIME, Unit::Seconds, "Seconds since start-up.");

        for name in [
            REQUESTS_TOTAL,
            REQUESTS_FAILED,
            WORKER_REQUESTS_TOTAL,
            DYNAMIC_SPLITS,
            SUB_QUERIES_TOTAL,
        ] {
            metrics::counter!(name).increment(0);
        }
    });
}
