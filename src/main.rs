use adaptive_dispatcher::config::Cli;
use adaptive_dispatcher::gateway::QueryGateway;
use adaptive_dispatcher::metrics::MetricsCollector;
use adaptive_dispatcher::registry::{HttpWorkerClient, RegistryConfig, WorkerClient, WorkerRegistry};
use adaptive_dispatcher::server::build_router;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config()?;

    tracing::info!("Starting dispatcher on {}", config.bind_addr);
    tracing::info!(
        "Split column '{}', max partitions {:?}, request deadline {:?}",
        config.split_column,
        config.max_partitions,
        config.request_deadline
    );

    // 1. Worker registry:
    let client: Arc<dyn WorkerClient> = Arc::new(HttpWorkerClient::new(config.health_timeout));
    let registry = WorkerRegistry::new(client.clone(), RegistryConfig::from(&config));

    for (name, endpoint) in &config.seed_workers {
        match registry.register(name, endpoint) {
            Ok(worker) => tracing::info!("Seed worker {} at {}", worker.id, worker.endpoint),
            Err(e) => tracing::warn!("Skipping seed worker {}: {}", name, e),
        }
    }
    if config.seed_workers.is_empty() {
        tracing::info!("No seed workers; register them with POST /workers");
    }

    // First round before serving, so seed workers are usable immediately.
    registry.check_all().await;
    registry.clone().start().await;

    // 2. Query path:
    let metrics = Arc::new(MetricsCollector::new());
    let gateway = Arc::new(QueryGateway::new(
        client,
        registry.clone(),
        metrics.clone(),
        &config,
    ));

    // 3. HTTP router:
    let app = build_router(gateway, registry.clone(), metrics.clone());

    // 4. Spawn stats reporter:
    let stats_registry = registry.clone();
    let stats_metrics = metrics.clone();
    let stats_interval = config.health_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_interval);

        loop {
            interval.tick().await;
            let active = stats_registry.list_active();
            tracing::info!(
                "Dispatcher stats: {} active workers, {} queries, {} dynamic splits",
                active.len(),
                stats_metrics.requests_total(),
                stats_metrics.dynamic_splits()
            );
            for worker in active {
                tracing::info!(
                    "  - {} {} status={:?} in_flight={} cpu={:?} memory={:?}",
                    worker.id,
                    worker.endpoint,
                    worker.status,
                    stats_registry.in_flight(&worker.id),
                    worker.cpu,
                    worker.memory
                );
            }
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
