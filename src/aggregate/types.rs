use crate::query::Row;
use crate::registry::WorkerId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    /// At least one partition failed; rows cover only the surviving partitions.
    Partial,
}

/// Final, merged answer to one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub rows: Vec<Row>,
    pub status: ResultStatus,
    #[serde(skip)]
    pub elapsed: Duration,
    /// Partial rows contributed by each worker.
    pub contributions: BTreeMap<WorkerId, usize>,
    pub failed_partitions: usize,
    pub total_partitions: usize,
}
