use crate::aggregate::{AggregatedResult, ResultStatus};
use crate::error::DispatchError;
use crate::query::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub rows: Vec<Row>,
    /// `success`, `partial` or `error`.
    pub status: String,
    /// Seconds.
    pub elapsed: f64,
    pub failed_partitions: usize,
    pub total_partitions: usize,
    /// Rows contributed per worker.
    pub workers: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl QueryResponse {
    pub fn from_result(result: AggregatedResult) -> Self {
        let status = match result.status {
            ResultStatus::Success => "success",
            ResultStatus::Partial => "partial",
        };
        Self {
            rows: result.rows,
            status: status.to_string(),
            elapsed: result.elapsed.as_secs_f64(),
            failed_partitions: result.failed_partitions,
            total_partitions: result.total_partitions,
            workers: result
                .contributions
                .into_iter()
                .map(|(id, rows)| (id.0, rows))
                .collect(),
            error: None,
        }
    }

    pub fn from_error(error: &DispatchError, elapsed: Duration) -> Self {
        let (failed_partitions, total_partitions) = match error {
            DispatchError::AllWorkersFailed { attempted, .. } => (*attempted, *attempted),
            _ => (0, 0),
        };
        Self {
            rows: Vec::new(),
            status: "error".to_string(),
            elapsed: elapsed.as_secs_f64(),
            failed_partitions,
            total_partitions,
            workers: BTreeMap::new(),
            error: Some(ErrorBody {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
        }
    }
}
