//! Result Aggregation Module
//!
//! Merges the partial results of a plan into the final row set.
//!
//! ## Merge Rules
//! - **COUNT / SUM**: Summed with checked integer arithmetic; overflow is an error, never a wrap.
//! - **AVG**: Sum of partial sums over sum of partial counts (never an average of averages).
//! - **MIN / MAX**: Extremum over partial extrema, ignoring partitions that saw no rows.
//! - **GROUP BY**: Rows are re-grouped by their non-aggregate columns, then HAVING is applied
//!   to the merged groups.
//! - **Plain SELECT**: Concatenated in sub-query order, then globally sorted and limited.
//!
//! Failed partitions downgrade the status to `partial`; rows from the survivors are kept.

pub mod accumulator;
pub mod merger;
pub mod types;

pub use merger::aggregate;
pub use types::{AggregatedResult, ResultStatus};
