use super::protocol::{
    ENDPOINT_EXECUTE, ENDPOINT_HEALTH, ExecuteRequest, ExecuteResponse, HealthResponse, PROBE_SQL,
};
use super::types::{Worker, WorkerHealth};
use crate::error::SubQueryError;
use crate::query::Row;

use async_trait::async_trait;
use std::time::Duration;

/// The narrow interface the dispatcher needs from a worker's compute engine.
///
/// Callers enforce timeouts; implementations just perform the call.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn execute(&self, worker: &Worker, sql: &str) -> Result<Vec<Row>, SubQueryError>;

    async fn health(&self, worker: &Worker) -> Result<WorkerHealth, SubQueryError>;
}

/// `WorkerClient` over HTTP/JSON.
pub struct HttpWorkerClient {
    http_client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(connect_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self { http_client }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn execute(&self, worker: &Worker, sql: &str) -> Result<Vec<Row>, SubQueryError> {
        let url = format!("{}{}", worker.endpoint, ENDPOINT_EXECUTE);
        let payload = ExecuteRequest {
            sql: sql.to_string(),
        };

        let response = self.http_client.post(url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SubQueryError::Rejected {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let body: ExecuteResponse = response.json().await?;
        Ok(body.rows.unwrap_or_default())
    }

    async fn health(&self, worker: &Worker) -> Result<WorkerHealth, SubQueryError> {
        let url = format!("{}{}", worker.endpoint, ENDPOINT_HEALTH);
        let response = self.http_client.get(url).send().await?;

        // Workers without a health endpoint are probed with a trivial statement.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            self.execute(worker, PROBE_SQL).await?;
            return Ok(WorkerHealth::default());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(SubQueryError::Rejected {
                status: status.as_u16(),
                message: format!("health check returned {}", status),
            });
        }

        // The body is optional and free-form; only a JSON object with figures is used.
        let body = response.text().await?;
        let figures: HealthResponse = serde_json::from_str(&body).unwrap_or_default();

        Ok(WorkerHealth {
            cpu: figures.cpu,
            memory: figures.memory,
        })
    }
}
