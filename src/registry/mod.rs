//! Worker Registry Module
//!
//! Tracks the live set of worker endpoints and their health, and supplies the
//! worker snapshot every query plan is built against.
//!
//! ## Core Mechanisms
//! - **Snapshots**: Writers rebuild an immutable `RegistrySnapshot` and publish it by swapping
//!   an `Arc`; readers clone the current `Arc` and never wait on health-check I/O.
//! - **Health Checks**: A background loop probes every known worker. New workers stay
//!   probationary until their first successful check; `N` consecutive failures take an online
//!   worker offline, and offline workers return on the next success.
//! - **Load**: In-flight and completed sub-query counts per worker, tracked with atomics.
//! - **Worker Client**: `WorkerClient` is the seam to the workers' compute engine
//!   (`POST /execute`, `GET /health`).

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod service;
pub mod types;

pub use client::{HttpWorkerClient, WorkerClient};
pub use service::{RegistryConfig, WorkerRegistry};
pub use types::{Worker, WorkerId, WorkerStatus};
