use super::types::{PartitionPlan, PartitionPredicate, SplitStrategy, SubQuery};
use crate::error::DispatchError;
use crate::query::ParsedQuery;
use crate::query::types::KeyRange;
use crate::registry::Worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

pub struct PartitionPlanner {
    /// Cap on sub-queries per plan; `None` means one per active worker.
    max_partitions: Option<usize>,
    next_worker: AtomicUsize,
}

impl PartitionPlanner {
    pub fn new(max_partitions: Option<usize>) -> Self {
        Self {
            max_partitions: max_partitions.filter(|&n| n > 0),
            next_worker: AtomicUsize::new(0),
        }
    }

    /// Builds the plan for `query` against one registry snapshot (`workers`, ascending by id).
    pub fn plan(
        &self,
        query_id: Uuid,
        query: &ParsedQuery,
        workers: &[Worker],
    ) -> Result<PartitionPlan, DispatchError> {
        if workers.is_empty() {
            return Err(DispatchError::NoWorkersAvailable);
        }

        let partitions = self
            .max_partitions
            .map_or(workers.len(), |max| max.min(workers.len()));

        let splittable = query.features.is_splittable() && query.from_sql.is_some();
        if !splittable || partitions == 1 {
            return Ok(self.single(query_id, query, workers));
        }

        // With fewer partitions than workers, rotate which workers get them.
        let offset = if partitions < workers.len() {
            self.next_worker.fetch_add(1, Ordering::Relaxed) % workers.len()
        } else {
            0
        };
        let worker_for = |i: usize| workers[(offset + i) % workers.len()].clone();
        let column = query.split_key.clone();

        let plan = match query.features.range {
            Some(range) if range.len() >= 2 => {
                let sub_queries = split_range(range, partitions)
                    .into_iter()
                    .enumerate()
                    .map(|(i, (start, end))| {
                        let predicate = PartitionPredicate::Range {
                            column: column.clone(),
                            start,
                            end,
                        };
                        sub_query(i, worker_for(i), predicate, query)
                    })
                    .collect();
                PartitionPlan {
                    query_id,
                    strategy: SplitStrategy::Range,
                    sub_queries,
                }
            }
            Some(_) => self.single(query_id, query, workers),
            None => {
                let buckets = partitions as u32;
                let sub_queries = (0..partitions)
                    .map(|i| {
                        let predicate = PartitionPredicate::HashBucket {
                            column: column.clone(),
                            bucket: i as u32,
                            buckets,
                        };
                        sub_query(i, worker_for(i), predicate, query)
                    })
                    .collect();
                PartitionPlan {
                    query_id,
                    strategy: SplitStrategy::Hash,
                    sub_queries,
                }
            }
        };

        tracing::debug!(
            "[{}] {:?} plan with {} sub-queries over {} workers",
            query_id,
            plan.strategy,
            plan.sub_queries.len(),
            workers.len()
        );

        Ok(plan)
    }

    fn single(&self, query_id: Uuid, query: &ParsedQuery, workers: &[Worker]) -> PartitionPlan {
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % workers.len();
        PartitionPlan {
            query_id,
            strategy: SplitStrategy::Single,
            sub_queries: vec![sub_query(
                0,
                workers[idx].clone(),
                PartitionPredicate::All,
                query,
            )],
        }
    }
}

fn sub_query(id: usize, worker: Worker, predicate: PartitionPredicate, query: &ParsedQuery) -> SubQuery {
    let sql = query.sub_query_sql(predicate.to_sql().as_deref());
    SubQuery {
        id,
        worker,
        predicate,
        sql,
    }
}

/// Splits an inclusive range into at most `partitions` contiguous sub-ranges. The first
/// `len % n` sub-ranges get one extra key; never more sub-ranges than keys.
pub fn split_range(range: KeyRange, partitions: usize) -> Vec<(i64, i64)> {
    let len = range.len();
    if len == 0 || partitions == 0 {
        return Vec::new();
    }

    let parts = (partitions as u128).min(len);
    let base = len / parts;
    let remainder = len % parts;

    let mut out = Vec::with_capacity(parts as usize);
    let mut start = i128::from(range.low);
    for i in 0..parts {
        let size = base + u128::from(i < remainder);
        let end = start + size as i128 - 1;
        out.push((start as i64, end as i64));
        start = end + 1;
    }
    out
}
