//! Runtime configuration.
//!
//! `Cli` is the command-line/environment surface parsed by the binary; library code only
//! ever sees the plain `DispatcherConfig`, which has sensible defaults for tests.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Address the HTTP API listens on.
    pub bind_addr: SocketAddr,
    /// Workers known at start-up, as `(name, endpoint)` pairs.
    pub seed_workers: Vec<(String, String)>,
    /// Integer column used for range and hash partitioning.
    pub split_column: String,
    /// Upper bound on sub-queries per plan; `None` means one per active worker.
    pub max_partitions: Option<usize>,
    pub health_interval: Duration,
    pub health_timeout: Duration,
    /// Consecutive failed checks before a worker leaves the active set.
    pub failure_threshold: u32,
    pub sub_query_timeout: Duration,
    pub retry_backoff: Duration,
    /// Overall budget for one query's dispatch batch.
    pub request_deadline: Duration,
    /// Process-wide cap on concurrent worker calls.
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            seed_workers: Vec::new(),
            split_column: "id".to_string(),
            max_partitions: None,
            health_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            failure_threshold: 3,
            sub_query_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(50),
            request_deadline: Duration::from_secs(15),
            max_in_flight: 64,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dispatcher", about = "Adaptive SQL query dispatcher")]
pub struct Cli {
    #[arg(long, env = "DISPATCHER_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Worker to register at start-up, as `name=http://host:port` (repeatable).
    #[arg(long = "worker", env = "DISPATCHER_WORKERS", value_delimiter = ',')]
    pub workers: Vec<String>,

    #[arg(long, env = "SPLIT_COLUMN", default_value = "id")]
    pub split_column: String,

    #[arg(long, env = "MAX_PARTS")]
    pub max_partitions: Option<usize>,

    #[arg(long, env = "HEALTH_INTERVAL_MS", default_value_t = 5000)]
    pub health_interval_ms: u64,

    #[arg(long, env = "FAILURE_THRESHOLD", default_value_t = 3)]
    pub failure_threshold: u32,

    #[arg(long, env = "SUB_QUERY_TIMEOUT_MS", default_value_t = 5000)]
    pub sub_query_timeout_ms: u64,

    #[arg(long, env = "REQUEST_DEADLINE_MS", default_value_t = 15000)]
    pub request_deadline_ms: u64,

    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = 64)]
    pub max_in_flight: usize,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<DispatcherConfig> {
        let mut seed_workers = Vec::with_capacity(self.workers.len());
        for (i, spec) in self.workers.iter().enumerate() {
            seed_workers.push(parse_worker_spec(spec, i)?);
        }

        if self.failure_threshold == 0 {
            anyhow::bail!("--failure-threshold must be at least 1");
        }
        if self.max_in_flight == 0 {
            anyhow::bail!("--max-in-flight must be at least 1");
        }

        let defaults = DispatcherConfig::default();
        Ok(DispatcherConfig {
            bind_addr: self.bind,
            seed_workers,
            split_column: self.split_column,
            max_partitions: self.max_partitions.filter(|&n| n > 0),
            health_interval: Duration::from_millis(self.health_interval_ms),
            health_timeout: defaults.health_timeout,
            failure_threshold: self.failure_threshold,
            sub_query_timeout: Duration::from_millis(self.sub_query_timeout_ms),
            retry_backoff: defaults.retry_backoff,
            request_deadline: Duration::from_millis(self.request_deadline_ms),
            max_in_flight: self.max_in_flight,
        })
    }
}

/// Accepts `name=url` or a bare url (named `worker-<n>`).
pub fn parse_worker_spec(spec: &str, index: usize) -> anyhow::Result<(String, String)> {
    let spec = spec.trim();
    let (name, endpoint) = match spec.split_once('=') {
        Some((name, endpoint)) => (name.trim().to_string(), endpoint.trim().to_string()),
        None => (format!("worker-{}", index + 1), spec.to_string()),
    };

    if name.is_empty() {
        anyhow::bail!("worker name is empty in '{}'", spec);
    }
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        anyhow::bail!("worker endpoint must be an http(s) url, got '{}'", endpoint);
    }

    Ok((name, endpoint.trim_end_matches('/').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_spec_named() {
        let (name, endpoint) = parse_worker_spec("w1=http://10.0.0.1:8001/", 0).unwrap();
        assert_eq!(name, "w1");
        assert_eq!(endpoint, "http://10.0.0.1:8001");
    }

    #[test]
    fn test_parse_worker_spec_bare_url_gets_generated_name() {
        let (name, endpoint) = parse_worker_spec("http://worker-svc:8001", 2).unwrap();
        assert_eq!(name, "worker-3");
        assert_eq!(endpoint, "http://worker-svc:8001");
    }

    #[test]
    fn test_parse_worker_spec_rejects_non_http() {
        assert!(parse_worker_spec("w1=tcp://x:1", 0).is_err());
        assert!(parse_worker_spec("=http://x:1", 0).is_err());
    }

    #[test]
    fn test_cli_into_config() {
        let cli = Cli::parse_from([
            "dispatcher",
            "--worker",
            "a=http://a:8001,b=http://b:8001",
            "--max-partitions",
            "0",
            "--sub-query-timeout-ms",
            "250",
        ]);
        let config = cli.into_config().unwrap();

        assert_eq!(config.seed_workers.len(), 2);
        assert_eq!(config.seed_workers[1].0, "b");
        assert_eq!(config.max_partitions, None);
        assert_eq!(config.sub_query_timeout, Duration::from_millis(250));
        assert_eq!(config.split_column, "id");
        assert_eq!(config.failure_threshold, 3);
    }
}
