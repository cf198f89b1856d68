//! Adaptive Query Dispatcher Library
//!
//! This library crate defines the modules behind the `dispatcher` binary (`main.rs`).
//! The dispatcher sits in front of a pool of SQL workers, splits each incoming SELECT
//! into partition-scoped sub-queries, runs them in parallel and merges the partial
//! results into one answer.
//!
//! ## Architecture Modules
//!
//! - **`query`**: SQL parsing and validation. Produces a typed `ParsedQuery` carrying the
//!   projection layout, grouping, ordering and the features the planner decides on.
//! - **`registry`**: The worker pool. Health checks, the probationary/online/offline
//!   lifecycle, in-flight load and immutable snapshots for planning.
//! - **`planner`**: Decides single-worker, range or hash splitting and renders the
//!   per-partition SQL.
//! - **`dispatch`**: Concurrent fan-out with timeouts, one retry and a request deadline.
//! - **`aggregate`**: Two-phase merge of partial aggregates, HAVING, global ORDER BY/LIMIT.
//! - **`metrics`**: Counters exposed as Prometheus text, JSON and server-sent events.
//! - **`gateway`**: Ties the above together for `POST /query`.
//! - **`server`**: HTTP router assembly.

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod planner;
pub mod query;
pub mod registry;
pub mod server;

#[cfg(test)]
pub mod testing;
