//! Partition Planning Module
//!
//! Decides whether and how a parsed query is fanned out across the active workers.
//!
//! ## Strategies
//! - **Single**: Queries with nothing to gain from splitting (no join, grouping, ordering or key
//!   range) run whole on one worker, chosen round-robin.
//! - **Range**: A bounded range on the split column is cut into contiguous, non-overlapping
//!   sub-ranges, one per worker. The first `len % W` sub-ranges are one key larger.
//! - **Hash**: Otherwise rows are bucketed by `((key % W) + W) % W`.
//!
//! Every strategy covers the original row set exactly once.

pub mod partitioner;
pub mod types;

pub use partitioner::PartitionPlanner;
pub use types::{PartitionPlan, PartitionPredicate, SplitStrategy, SubQuery};

#[cfg(test)]
mod tests;
