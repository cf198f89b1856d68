//! Error Taxonomy
//!
//! Two levels of failure exist in the dispatcher:
//!
//! - **`DispatchError`**: the outcome of a whole query. Every variant is turned into a
//!   structured HTTP response by the gateway; none of them can take the process down.
//! - **`SubQueryError`**: the outcome of a single call to a single worker. These are
//!   absorbed by the coordinator (retry, then degrade to a failed partition) and only
//!   surface to callers as a `partial` status and a failure count.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    /// The SQL text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Valid SQL, but a construct the dispatcher cannot split or merge correctly.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("no workers available")]
    NoWorkersAvailable,

    /// Every sub-query of the plan failed (after its retry) or was cancelled.
    #[error("all {attempted} sub-queries failed: {last_error}")]
    AllWorkersFailed { attempted: usize, last_error: String },

    /// Merging partial aggregates would overflow the column's numeric type.
    #[error("aggregation overflow in column '{column}'")]
    AggregationOverflow { column: String },
}

impl DispatchError {
    /// Stable machine-readable name used in responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Parse(_) => "parse_error",
            DispatchError::UnsupportedQuery(_) => "unsupported_query",
            DispatchError::NoWorkersAvailable => "no_workers_available",
            DispatchError::AllWorkersFailed { .. } => "all_workers_failed",
            DispatchError::AggregationOverflow { .. } => "aggregation_overflow",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Parse(_) | DispatchError::UnsupportedQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::NoWorkersAvailable => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::AllWorkersFailed { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::AggregationOverflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-caused errors are never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::Parse(_) | DispatchError::UnsupportedQuery(_)
        )
    }
}

/// Failure of one worker call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubQueryError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset, DNS failure and similar.
    #[error("transport error: {0}")]
    Transport(String),

    /// The worker answered but refused the SQL (engine error).
    #[error("worker rejected sub-query with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The worker answered with a body that is not a valid result set.
    #[error("malformed worker response: {0}")]
    Malformed(String),
}

impl SubQueryError {
    /// Only failures where the worker may not have seen the request are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubQueryError::Timeout(_) | SubQueryError::Transport(_))
    }

    /// Whether the failure says something about the worker's reachability.
    pub fn is_health_failure(&self) -> bool {
        self.is_retryable()
    }
}

impl From<reqwest::Error> for SubQueryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SubQueryError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            SubQueryError::Malformed(e.to_string())
        } else {
            SubQueryError::Transport(e.to_string())
        }
    }
}
