//! Dispatch Module Tests
//!
//! ## Test Scopes
//! - **Fan-out**: One partial result per sub-query, in sub-query order.
//! - **Retries**: Transport errors and timeouts retry once, rejections never.
//! - **Failure Isolation**: Partial failure degrades, total failure errors, the deadline cancels.
//! - **Bookkeeping**: Registry health, in-flight load and per-worker metrics are updated.

#[cfg(test)]
mod tests {
    use crate::dispatch::{CoordinatorConfig, DispatchCoordinator, PartialStatus};
    use crate::error::{DispatchError, SubQueryError};
    use crate::metrics::MetricsCollector;
    use crate::planner::{PartitionPlan, PartitionPlanner};
    use crate::query::parse_query;
    use crate::registry::{WorkerId, WorkerRegistry};
    use crate::testing::{MockWorkerClient, online_registry, row};

    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use uuid::Uuid;

    struct Fixture {
        client: Arc<MockWorkerClient>,
        registry: Arc<WorkerRegistry>,
        metrics: Arc<MetricsCollector>,
        coordinator: DispatchCoordinator,
    }

    async fn fixture(names: &[&str], config: CoordinatorConfig) -> Fixture {
        let client = MockWorkerClient::new();
        let registry = online_registry(client.clone(), names).await;
        let metrics = Arc::new(MetricsCollector::new());
        let coordinator =
            DispatchCoordinator::new(client.clone(), registry.clone(), metrics.clone(), config);

        Fixture {
            client,
            registry,
            metrics,
            coordinator,
        }
    }

    fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig {
            sub_query_timeout: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(1),
            max_in_flight: 64,
        }
    }

    fn grouped_plan(registry: &WorkerRegistry) -> PartitionPlan {
        let query = parse_query("SELECT v, COUNT(*) FROM numbers GROUP BY v", "id").unwrap();
        PartitionPlanner::new(None)
            .plan(Uuid::new_v4(), &query, &registry.list_active())
            .unwrap()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    // ============================================================
    // FAN-OUT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_one_partial_per_sub_query_in_order() {
        let f = fixture(&["w1", "w2", "w3"], fast_config()).await;
        f.client.rows("w1", vec![row(json!({"_p0": 1, "_p1": 10}))]);
        f.client.rows("w3", vec![row(json!({"_p0": 3, "_p1": 30}))]);
        // w2 is slowest but must still land in slot 1.
        f.client.delay("w2", Duration::from_millis(20));

        let plan = grouped_plan(&f.registry);
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert_eq!(results.len(), 3);
        for (i, partial) in results.iter().enumerate() {
            assert_eq!(partial.sub_query_id, i);
            assert_eq!(partial.status, PartialStatus::Ok);
            assert_eq!(partial.attempts, 1);
        }
        assert_eq!(results[0].rows.len(), 1);
        assert!(results[1].rows.is_empty());
        assert_eq!(results[2].worker_id, WorkerId::new("w3"));
    }

    // ============================================================
    // RETRY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_transport_error_is_retried_once() {
        let f = fixture(&["w1", "w2"], fast_config()).await;
        f.client
            .fail("w2", SubQueryError::Transport("connection reset".to_string()));

        let plan = grouped_plan(&f.registry);
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert_eq!(f.client.calls_to("w2"), 2);
        assert_eq!(results[1].status, PartialStatus::Error);
        assert_eq!(results[1].attempts, 2);
        assert!(results[1].error.as_deref().unwrap().contains("connection reset"));
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn test_retry_can_succeed() {
        let f = fixture(&["w1"], fast_config()).await;
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        f.client.respond("w1", move |_| {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(SubQueryError::Transport("connection reset".to_string()))
            } else {
                Ok(vec![row(json!({"_p0": 1}))])
            }
        });

        let plan = grouped_plan(&f.registry);
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert!(results[0].is_ok());
        assert_eq!(results[0].attempts, 2);
        assert_eq!(results[0].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let f = fixture(&["w1", "w2"], fast_config()).await;
        f.client.fail(
            "w1",
            SubQueryError::Rejected {
                status: 502,
                message: "syntax error".to_string(),
            },
        );

        let plan = grouped_plan(&f.registry);
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert_eq!(f.client.calls_to("w1"), 1);
        assert_eq!(results[0].status, PartialStatus::Error);
        assert_eq!(results[0].attempts, 1);

        // The worker answered, so its health is untouched.
        let snapshot = f.registry.snapshot();
        assert_eq!(
            snapshot.get(&WorkerId::new("w1")).unwrap().consecutive_failures,
            0
        );
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let f = fixture(&["w1", "w2"], fast_config()).await;
        f.client.delay("w1", Duration::from_millis(500));

        let plan = grouped_plan(&f.registry);
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert_eq!(results[0].status, PartialStatus::Timeout);
        assert_eq!(results[0].attempts, 2);
        assert_eq!(f.client.calls_to("w1"), 2);
        assert!(results[1].is_ok());
    }

    // ============================================================
    // FAILURE ISOLATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_all_failed_is_an_error() {
        let f = fixture(&["w1", "w2"], fast_config()).await;
        for name in ["w1", "w2"] {
            f.client
                .fail(name, SubQueryError::Transport("connection refused".to_string()));
        }

        let plan = grouped_plan(&f.registry);
        let err = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap_err();

        match err {
            DispatchError::AllWorkersFailed {
                attempted,
                last_error,
            } => {
                assert_eq!(attempted, 2);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("expected AllWorkersFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_cancels_outstanding_sub_queries() {
        let config = CoordinatorConfig {
            sub_query_timeout: Duration::from_secs(5),
            ..fast_config()
        };
        let f = fixture(&["w1", "w2"], config).await;
        f.client.delay("w2", Duration::from_secs(3));

        let plan = grouped_plan(&f.registry);
        let started = std::time::Instant::now();
        let results = f
            .coordinator
            .dispatch(&plan, Instant::now() + Duration::from_millis(100))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(results[0].is_ok());
        assert_eq!(results[1].status, PartialStatus::Cancelled);

        // Aborted tasks release their in-flight slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.registry.in_flight(&WorkerId::new("w2")), 0);
    }

    // ============================================================
    // BOOKKEEPING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_permit_pool_bounds_concurrency() {
        let config = CoordinatorConfig {
            max_in_flight: 1,
            ..fast_config()
        };
        let f = fixture(&["w1", "w2", "w3"], config).await;
        for name in ["w1", "w2", "w3"] {
            f.client.delay(name, Duration::from_millis(30));
        }

        let plan = grouped_plan(&f.registry);
        let started = std::time::Instant::now();
        let results = f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        assert!(results.iter().all(|r| r.is_ok()));
        // Serialized by the single permit.
        assert!(started.elapsed() >= Duration::from_millis(90));
        assert_eq!(f.coordinator.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_update_registry_and_metrics() {
        let f = fixture(&["w1", "w2"], fast_config()).await;
        f.client
            .fail("w2", SubQueryError::Transport("connection refused".to_string()));

        let plan = grouped_plan(&f.registry);
        f.coordinator.dispatch(&plan, far_deadline()).await.unwrap();

        let snapshot = f.registry.snapshot();
        assert_eq!(
            snapshot.get(&WorkerId::new("w2")).unwrap().consecutive_failures,
            1
        );
        assert_eq!(f.registry.completed(&WorkerId::new("w1")), 1);
        assert_eq!(f.registry.completed(&WorkerId::new("w2")), 0);
        assert_eq!(f.registry.in_flight(&WorkerId::new("w1")), 0);

        let metrics = f.metrics.snapshot();
        assert_eq!(metrics.worker_requests_total, 2);
        assert_eq!(metrics.workers["w2"].failures, 1);
    }
}
