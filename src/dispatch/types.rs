use crate::query::Row;
use crate::registry::WorkerId;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialStatus {
    Ok,
    /// The worker rejected the SQL, or the call failed twice.
    Error,
    Timeout,
    /// Still outstanding when the request deadline expired.
    Cancelled,
}

/// Outcome of one sub-query. Produced by the coordinator, consumed once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialResult {
    pub worker_id: WorkerId,
    pub sub_query_id: usize,
    pub rows: Vec<Row>,
    pub status: PartialStatus,
    pub attempts: u32,
    #[serde(skip)]
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl PartialResult {
    pub fn ok(worker_id: WorkerId, sub_query_id: usize, rows: Vec<Row>) -> Self {
        Self {
            worker_id,
            sub_query_id,
            rows,
            status: PartialStatus::Ok,
            attempts: 1,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    pub fn failed(
        worker_id: WorkerId,
        sub_query_id: usize,
        status: PartialStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            worker_id,
            sub_query_id,
            rows: Vec::new(),
            status,
            attempts: 1,
            elapsed: Duration::ZERO,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PartialStatus::Ok
    }
}
