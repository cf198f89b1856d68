use crate::registry::Worker;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Whole query on one worker.
    Single,
    /// Contiguous sub-ranges of the split column.
    Range,
    /// Modulo buckets of the split column.
    Hash,
}

/// Slice of the row domain one sub-query is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionPredicate {
    All,
    /// Inclusive on both ends.
    Range { column: String, start: i64, end: i64 },
    HashBucket {
        column: String,
        bucket: u32,
        buckets: u32,
    },
}

impl PartitionPredicate {
    /// SQL condition AND-ed onto the original filter, `None` for `All`.
    ///
    /// Bucket 0 also takes rows whose key is NULL so hashing never drops them.
    pub fn to_sql(&self) -> Option<String> {
        match self {
            PartitionPredicate::All => None,
            PartitionPredicate::Range { column, start, end } => {
                Some(format!("{} BETWEEN {} AND {}", column, start, end))
            }
            PartitionPredicate::HashBucket {
                column,
                bucket,
                buckets,
            } => {
                let bucket_expr = format!(
                    "(({col} % {n}) + {n}) % {n} = {b}",
                    col = column,
                    n = buckets,
                    b = bucket
                );
                if *bucket == 0 {
                    Some(format!("({} OR {} IS NULL)", bucket_expr, column))
                } else {
                    Some(bucket_expr)
                }
            }
        }
    }

    /// Whether a row with this split-key value belongs to the partition.
    pub fn contains(&self, key: Option<i64>) -> bool {
        match (self, key) {
            (PartitionPredicate::All, _) => true,
            (PartitionPredicate::Range { start, end, .. }, Some(k)) => *start <= k && k <= *end,
            (PartitionPredicate::Range { .. }, None) => false,
            (PartitionPredicate::HashBucket { bucket, buckets, .. }, Some(k)) => {
                k.rem_euclid(i64::from(*buckets)) == i64::from(*bucket)
            }
            (PartitionPredicate::HashBucket { bucket, .. }, None) => *bucket == 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubQuery {
    /// Position in the plan; partial results are merged in this order.
    pub id: usize,
    pub worker: Worker,
    pub predicate: PartitionPredicate,
    pub sql: String,
}

#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub query_id: Uuid,
    pub strategy: SplitStrategy,
    pub sub_queries: Vec<SubQuery>,
}

impl PartitionPlan {
    /// A dynamic split: the query was fanned out to more than one sub-query.
    pub fn is_split(&self) -> bool {
        self.sub_queries.len() > 1
    }
}
