//! Metrics Module
//!
//! Process-wide request, split and latency counters for the dispatcher.
//!
//! ## Exposure
//! - **`GET /metrics`**: Prometheus text format. The unlabelled `dispatcher_requests_total`,
//!   `dispatcher_worker_requests_total` and `dispatcher_dynamic_splits_total` series are kept
//!   stable for dashboards that scrape them by name.
//! - **`GET /metrics/snapshot`**: The same counters as JSON.
//! - **`GET /metrics/stream`**: Server-sent events, one snapshot per completed query.

pub mod collector;
pub mod handlers;

pub use collector::{MetricsCollector, MetricsSnapshot};
