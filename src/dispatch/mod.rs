//! Dispatch Module
//!
//! Executes a partition plan: every sub-query runs as its own tokio task, bounded by a
//! process-wide permit pool, and the caller only waits at the batch join point.
//!
//! ## Failure Isolation
//! - **Timeouts**: Each attempt has its own timeout; a timeout or transport error is retried
//!   once against the same worker after a short jittered backoff.
//! - **Rejections**: A worker that refused the SQL is not retried.
//! - **Deadline**: Sub-queries still running when the request deadline expires are aborted and
//!   reported as `cancelled`.
//! - **Degradation**: Failed sub-queries become failed partial results; only a plan where
//!   nothing succeeded is an error.

pub mod coordinator;
pub mod types;

pub use coordinator::{CoordinatorConfig, DispatchCoordinator};
pub use types::{PartialResult, PartialStatus};

#[cfg(test)]
mod tests;
