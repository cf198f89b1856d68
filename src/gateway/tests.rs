//! Gateway Module Tests
//!
//! ## Test Scopes
//! - **Query Flow**: Parse, plan, dispatch and merge against scripted workers.
//! - **Rejection**: Invalid and non-SELECT statements never reach a worker.
//! - **Counters**: Requests are counted on entry, by kind, failures included.
//! - **HTTP**: The full router against real in-process workers over TCP.

#[cfg(test)]
mod tests {
    use crate::aggregate::ResultStatus;
    use crate::config::DispatcherConfig;
    use crate::error::{DispatchError, SubQueryError};
    use crate::gateway::QueryGateway;
    use crate::metrics::MetricsCollector;
    use crate::registry::{HttpWorkerClient, RegistryConfig, WorkerClient, WorkerRegistry};
    use crate::server::build_router;
    use crate::testing::{MockWorkerClient, online_registry, row};

    use axum::Json;
    use axum::Router;
    use axum::routing::post;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        client: Arc<MockWorkerClient>,
        metrics: Arc<MetricsCollector>,
        gateway: QueryGateway,
    }

    async fn fixture(names: &[&str]) -> Fixture {
        let client = MockWorkerClient::new();
        let registry = online_registry(client.clone(), names).await;
        let metrics = Arc::new(MetricsCollector::new());
        let config = DispatcherConfig {
            sub_query_timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(1),
            ..DispatcherConfig::default()
        };
        let gateway = QueryGateway::new(client.clone(), registry, metrics.clone(), &config);

        Fixture {
            client,
            metrics,
            gateway,
        }
    }

    // ============================================================
    // QUERY FLOW TESTS
    // ============================================================

    #[tokio::test]
    async fn test_grouped_query_is_split_and_merged() {
        let f = fixture(&["w1", "w2", "w3"]).await;
        for name in ["w1", "w2", "w3"] {
            f.client.rows(name, vec![row(json!({"_p0": "a", "_p1": 2}))]);
        }

        let result = f
            .gateway
            .execute("SELECT v, COUNT(*) AS n FROM numbers GROUP BY v")
            .await
            .unwrap();

        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.total_partitions, 3);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["n"], json!(6));
        assert_eq!(f.client.calls().len(), 3);
        assert_eq!(f.metrics.dynamic_splits(), 1);
    }

    #[tokio::test]
    async fn test_plain_aggregate_goes_to_one_worker() {
        let f = fixture(&["w1", "w2", "w3", "w4"]).await;

        let result = f
            .gateway
            .execute("SELECT COUNT(*) FROM numbers")
            .await
            .unwrap();

        assert_eq!(result.total_partitions, 1);
        assert_eq!(f.client.calls().len(), 1);
        assert_eq!(f.metrics.dynamic_splits(), 0);
    }

    #[tokio::test]
    async fn test_failed_partition_degrades_to_partial() {
        let f = fixture(&["w1", "w2"]).await;
        f.client.rows("w1", vec![row(json!({"_p0": "a", "_p1": 2}))]);
        f.client
            .fail("w2", SubQueryError::Transport("connection refused".to_string()));

        let result = f
            .gateway
            .execute("SELECT v, COUNT(*) AS n FROM numbers GROUP BY v")
            .await
            .unwrap();

        assert_eq!(result.status, ResultStatus::Partial);
        assert_eq!(result.failed_partitions, 1);
        assert_eq!(result.rows[0]["n"], json!(2));
    }

    #[tokio::test]
    async fn test_no_workers_fails_before_dispatch() {
        let f = fixture(&[]).await;

        let err = f
            .gateway
            .execute("SELECT * FROM numbers")
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::NoWorkersAvailable);
        assert!(f.client.calls().is_empty());
    }

    // ============================================================
    // REJECTION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_non_select_is_rejected_without_network_calls() {
        let f = fixture(&["w1"]).await;

        let err = f.gateway.execute("DELETE FROM numbers").await.unwrap_err();

        assert!(matches!(err, DispatchError::UnsupportedQuery(_)));
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_sql_is_a_parse_error() {
        let f = fixture(&["w1"]).await;

        let err = f.gateway.execute("SELEC id FRM").await.unwrap_err();

        assert!(matches!(err, DispatchError::Parse(_)));
        assert!(f.client.calls().is_empty());
    }

    // ============================================================
    // COUNTER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_counters_include_failed_queries() {
        let f = fixture(&["w1"]).await;
        f.client
            .fail("w1", SubQueryError::Transport("connection refused".to_string()));

        let _ = f.gateway.execute("SELECT COUNT(*) FROM numbers").await;
        let _ = f.gateway.execute("not sql at all").await;
        let _ = f.gateway.execute("SELECT * FROM numbers").await;

        let snapshot = f.metrics.snapshot();
        assert_eq!(snapshot.requests_total, 3);
        assert_eq!(snapshot.requests_failed, 3);
        assert_eq!(snapshot.requests_by_kind["count"], 1);
        assert_eq!(snapshot.requests_by_kind["invalid"], 1);
        assert_eq!(snapshot.requests_by_kind["select"], 1);
    }

    // ============================================================
    // HTTP TESTS
    // ============================================================

    /// Worker holding one group per partition, whatever the predicate.
    async fn fake_execute(Json(body): Json<Value>) -> Json<Value> {
        let sql = body["sql"].as_str().unwrap_or_default();
        if sql.contains("GROUP BY") {
            Json(json!({ "rows": [{ "_p0": "a", "_p1": 2 }] }))
        } else {
            Json(json!({ "rows": [{ "?column?": 1 }] }))
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    async fn spawn_dispatcher() -> (String, Arc<WorkerRegistry>) {
        let config = DispatcherConfig::default();
        let client: Arc<dyn WorkerClient> = Arc::new(HttpWorkerClient::new(Duration::from_secs(1)));
        let registry = WorkerRegistry::new(client.clone(), RegistryConfig::from(&config));
        let metrics = Arc::new(MetricsCollector::new());
        let gateway = Arc::new(QueryGateway::new(
            client,
            registry.clone(),
            metrics.clone(),
            &config,
        ));

        let url = spawn(build_router(gateway, registry.clone(), metrics)).await;
        (url, registry)
    }

    #[tokio::test]
    async fn test_http_query_end_to_end() {
        let (dispatcher, registry) = spawn_dispatcher().await;
        let http = reqwest::Client::new();

        for name in ["w1", "w2"] {
            let endpoint = spawn(Router::new().route("/execute", post(fake_execute))).await;
            let response = http
                .post(format!("{}/workers", dispatcher))
                .json(&json!({ "name": name, "endpoint": endpoint }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 201);
        }
        registry.check_all().await;

        let response = http
            .post(format!("{}/query", dispatcher))
            .json(&json!({ "sql": "SELECT v, COUNT(*) AS n FROM numbers GROUP BY v" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["rows"], json!([{ "v": "a", "n": 4 }]));
        assert_eq!(body["total_partitions"], 2);
        assert_eq!(body["workers"]["w1"], 1);
        assert!(body.get("error").is_none());

        let metrics = http
            .get(format!("{}/metrics", dispatcher))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(metrics.contains("dispatcher_requests_total 1"));
        assert!(metrics.contains("dispatcher_dynamic_splits_total 1"));
    }

    #[tokio::test]
    async fn test_http_errors_are_structured() {
        let (dispatcher, _registry) = spawn_dispatcher().await;
        let http = reqwest::Client::new();

        let response = http
            .post(format!("{}/query", dispatcher))
            .json(&json!({ "sql": "SELECT * FROM numbers" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["kind"], "no_workers_available");

        let response = http
            .post(format!("{}/query", dispatcher))
            .json(&json!({ "sql": "DROP TABLE numbers" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = http
            .post(format!("{}/query", dispatcher))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "parse_error");
    }
}
