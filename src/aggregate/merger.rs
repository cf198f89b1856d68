use super::accumulator::Accumulator;
use super::types::{AggregatedResult, ResultStatus};
use crate::dispatch::PartialResult;
use crate::error::DispatchError;
use crate::query::types::{AggregateFn, ColumnSource, OrderKey, avg_count_key, avg_sum_key};
use crate::query::value::{Scalar, total_compare};
use crate::query::{ParsedQuery, Row};

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Merges partial results into the final answer.
///
/// Partials are taken in sub-query order, so the output does not depend on the order in
/// which workers answered.
pub fn aggregate(
    query: &ParsedQuery,
    mut partials: Vec<PartialResult>,
    elapsed: Duration,
) -> Result<AggregatedResult, DispatchError> {
    partials.sort_by_key(|p| p.sub_query_id);

    let total_partitions = partials.len();
    let failed_partitions = partials.iter().filter(|p| !p.is_ok()).count();

    if total_partitions > 0 && failed_partitions == total_partitions {
        let last_error = partials
            .iter()
            .rev()
            .find_map(|p| p.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(DispatchError::AllWorkersFailed {
            attempted: total_partitions,
            last_error,
        });
    }

    let mut contributions: BTreeMap<_, usize> = BTreeMap::new();
    for partial in partials.iter().filter(|p| p.is_ok()) {
        *contributions.entry(partial.worker_id.clone()).or_default() += partial.rows.len();
    }

    let surviving: Vec<&Row> = partials
        .iter()
        .filter(|p| p.is_ok())
        .flat_map(|p| p.rows.iter())
        .collect();

    let mut rows = if query.is_aggregating() {
        merge_groups(query, &surviving)?
    } else {
        surviving
            .into_iter()
            .map(|row| project(query, row))
            .collect()
    };

    if let Some(having) = &query.having {
        rows.retain(|row| having.matches(row));
    }

    let hidden: HashSet<&str> = query
        .columns
        .iter()
        .filter(|c| c.hidden)
        .map(|c| c.name.as_str())
        .collect();

    if query.distinct {
        rows = dedupe(rows, &hidden);
    }

    if !query.order_by.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, &query.order_by));
    }

    let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
    let limit = query
        .limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    let rows: Vec<Row> = rows
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|mut row| {
            row.retain(|key, _| !hidden.contains(key.as_str()));
            row
        })
        .collect();

    let status = if failed_partitions > 0 {
        ResultStatus::Partial
    } else {
        ResultStatus::Success
    };

    Ok(AggregatedResult {
        rows,
        status,
        elapsed,
        contributions,
        failed_partitions,
        total_partitions,
    })
}

/// Renames internal keys back to column names. Wildcard rows pass through unchanged.
fn project(query: &ParsedQuery, row: &Row) -> Row {
    if query.wildcard.is_some() {
        return row.clone();
    }

    let mut out = Row::new();
    for column in &query.columns {
        let value = row.get(&column.key).cloned().unwrap_or(Value::Null);
        out.insert(column.name.clone(), value);
    }
    out
}

struct Group {
    /// Values of the non-aggregate columns, by column index.
    values: Vec<Value>,
    accumulators: Vec<Option<Accumulator>>,
}

impl Group {
    fn new(query: &ParsedQuery, values: Vec<Value>) -> Self {
        let accumulators = query
            .columns
            .iter()
            .map(|c| match &c.source {
                ColumnSource::Aggregate { func, .. } => Some(Accumulator::new(*func)),
                ColumnSource::Value { .. } => None,
            })
            .collect();
        Self {
            values,
            accumulators,
        }
    }
}

/// Re-groups partial rows by their non-aggregate columns and combines the partial aggregates.
fn merge_groups(query: &ParsedQuery, rows: &[&Row]) -> Result<Vec<Row>, DispatchError> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let values: Vec<Value> = query
            .columns
            .iter()
            .map(|c| match c.source {
                ColumnSource::Value { .. } => row.get(&c.key).cloned().unwrap_or(Value::Null),
                ColumnSource::Aggregate { .. } => Value::Null,
            })
            .collect();
        let group_key = serde_json::to_string(&values).unwrap_or_default();

        let slot = match index.get(&group_key) {
            Some(&slot) => slot,
            None => {
                groups.push(Group::new(query, values));
                index.insert(group_key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];

        for (column, accumulator) in query.columns.iter().zip(group.accumulators.iter_mut()) {
            let (Some(accumulator), ColumnSource::Aggregate { func, .. }) =
                (accumulator, &column.source)
            else {
                continue;
            };

            let merged = if *func == AggregateFn::Avg {
                let sum = row
                    .get(&avg_sum_key(&column.key))
                    .cloned()
                    .unwrap_or(Value::Null);
                let count = row.get(&avg_count_key(&column.key));
                accumulator.merge(&sum, count)
            } else {
                let value = row.get(&column.key).cloned().unwrap_or(Value::Null);
                accumulator.merge(&value, None)
            };

            merged.map_err(|_| DispatchError::AggregationOverflow {
                column: column.name.clone(),
            })?;
        }
    }

    // An ungrouped aggregate over no rows still answers with one row.
    if groups.is_empty() && query.group_by.is_empty() {
        groups.push(Group::new(query, vec![Value::Null; query.columns.len()]));
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut out = Row::new();
            for (i, column) in query.columns.iter().enumerate() {
                let value = match &group.accumulators[i] {
                    Some(accumulator) => accumulator.finish(),
                    None => group.values[i].clone(),
                };
                out.insert(column.name.clone(), value);
            }
            out
        })
        .collect())
}

fn dedupe(rows: Vec<Row>, hidden: &HashSet<&str>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let visible: Vec<&Value> = row
                .iter()
                .filter(|(k, _)| !hidden.contains(k.as_str()))
                .map(|(_, v)| v)
                .collect();
            seen.insert(serde_json::to_string(&visible).unwrap_or_default())
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.column).map(Scalar::from_json).unwrap_or(Scalar::Null);
        let right = b.get(&key.column).map(Scalar::from_json).unwrap_or(Scalar::Null);

        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if key.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if key.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = total_compare(&left, &right);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
