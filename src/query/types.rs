use super::predicate::Predicate;
use serde::{Deserialize, Serialize};

/// One result row as returned by a worker: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFn::Count),
            "SUM" => Some(AggregateFn::Sum),
            "AVG" => Some(AggregateFn::Avg),
            "MIN" => Some(AggregateFn::Min),
            "MAX" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// Operation kind, used for per-kind request counters and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Aggregate(AggregateFn),
    /// Several different aggregate functions without grouping.
    MultiAggregate,
    GroupBy,
}

impl QueryKind {
    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Aggregate(AggregateFn::Count) => "count",
            QueryKind::Aggregate(AggregateFn::Sum) => "sum",
            QueryKind::Aggregate(AggregateFn::Avg) => "avg",
            QueryKind::Aggregate(AggregateFn::Min) => "min",
            QueryKind::Aggregate(AggregateFn::Max) => "max",
            QueryKind::MultiAggregate => "multi_aggregate",
            QueryKind::GroupBy => "group_by",
        }
    }
}

/// Where the value of an output column comes from in a partial row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    /// Projected unchanged by every partition. Part of the merge key when aggregating.
    Value { sql: String },
    /// Partial aggregate re-combined at merge time. `arg` is `None` for `COUNT(*)`.
    Aggregate { func: AggregateFn, arg: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// Name in the merged row: the user-facing name, or `key` for hidden columns.
    pub name: String,
    /// Alias of the column inside sub-query results.
    pub key: String,
    pub source: ColumnSource,
    /// Helper columns (grouping keys, sort keys, HAVING aggregates) that are not
    /// part of the final projection.
    pub hidden: bool,
}

impl OutputColumn {
    /// Select-list items this column contributes to every sub-query.
    pub fn select_items(&self) -> Vec<String> {
        match &self.source {
            ColumnSource::Value { sql } => vec![format!("{} AS {}", sql, self.key)],
            ColumnSource::Aggregate { func, arg } => {
                let arg_sql = arg.as_deref().unwrap_or("*");
                match func {
                    AggregateFn::Avg => vec![
                        format!("SUM({}) AS {}", arg_sql, avg_sum_key(&self.key)),
                        format!("COUNT({}) AS {}", arg_sql, avg_count_key(&self.key)),
                    ],
                    other => vec![format!("{}({}) AS {}", other.sql_name(), arg_sql, self.key)],
                }
            }
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.source, ColumnSource::Aggregate { .. })
    }
}

pub fn avg_sum_key(key: &str) -> String {
    format!("{}_sum", key)
}

pub fn avg_count_key(key: &str) -> String {
    format!("{}_cnt", key)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    /// Column of the merged row to sort by.
    pub column: String,
    /// Expression used for the per-worker `ORDER BY`.
    pub pushdown: String,
    pub descending: bool,
    /// Explicit `NULLS FIRST/LAST`, if the query had one.
    pub nulls_first: Option<bool>,
}

impl OrderKey {
    /// Effective null placement: NULLs behave as the largest value unless overridden.
    pub fn nulls_first(&self) -> bool {
        self.nulls_first.unwrap_or(self.descending)
    }

    pub fn pushdown_sql(&self) -> String {
        let mut sql = format!(
            "{} {}",
            self.pushdown,
            if self.descending { "DESC" } else { "ASC" }
        );
        if let Some(first) = self.nulls_first {
            sql.push_str(if first { " NULLS FIRST" } else { " NULLS LAST" });
        }
        sql
    }
}

/// Inclusive integer range on the split column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub low: i64,
    pub high: i64,
}

impl KeyRange {
    /// Number of keys in the range (0 when empty).
    pub fn len(&self) -> u128 {
        if self.high < self.low {
            0
        } else {
            (self.high as i128 - self.low as i128 + 1) as u128
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Structural features computed once during parsing; the planner decides on these
/// rather than on the SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFeatures {
    pub has_join: bool,
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_having: bool,
    pub has_aggregate: bool,
    pub has_limit: bool,
    /// Bounded range on the split column taken from the top-level WHERE conjunction.
    pub range: Option<KeyRange>,
}

impl QueryFeatures {
    /// Whether fanning out is worth it: joins, grouping, ordering or a key range.
    pub fn is_splittable(&self) -> bool {
        self.has_join || self.has_group_by || self.has_order_by || self.range.is_some()
    }
}

/// A validated SELECT statement in the typed form used by planner and aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub sql: String,
    pub kind: QueryKind,
    /// Driving table of the FROM clause.
    pub relation: Option<String>,
    /// Full FROM clause including joins.
    pub from_sql: Option<String>,
    pub filter: Option<String>,
    /// Grouping expressions, aliases and ordinals already resolved.
    pub group_by: Vec<String>,
    pub having: Option<Predicate>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub distinct: bool,
    /// Raw projection list for `SELECT *` style queries; rows then pass through as-is.
    pub wildcard: Option<String>,
    pub columns: Vec<OutputColumn>,
    /// Split column, qualified by the driving table when the query joins.
    pub split_key: String,
    pub features: QueryFeatures,
}

impl ParsedQuery {
    /// Whether partial rows must be re-grouped rather than concatenated.
    pub fn is_aggregating(&self) -> bool {
        self.features.has_aggregate || self.features.has_group_by
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &OutputColumn> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    /// Renders the SQL sent to one partition. `partition_predicate` is AND-ed onto the
    /// original filter; grouping is pushed down, HAVING never is, and ORDER BY/LIMIT
    /// only for non-aggregating queries.
    pub fn sub_query_sql(&self, partition_predicate: Option<&str>) -> String {
        let mut items: Vec<String> = Vec::new();
        if let Some(raw) = &self.wildcard {
            items.push(raw.clone());
        }
        for column in &self.columns {
            items.extend(column.select_items());
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&items.join(", "));

        if let Some(from) = &self.from_sql {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }

        let filter = match (&self.filter, partition_predicate) {
            (Some(f), Some(p)) => Some(format!("({}) AND {}", f, p)),
            (Some(f), None) => Some(f.clone()),
            (None, Some(p)) => Some(p.to_string()),
            (None, None) => None,
        };
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.is_aggregating() {
            if !self.order_by.is_empty() {
                let keys: Vec<String> = self.order_by.iter().map(|k| k.pushdown_sql()).collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&keys.join(", "));
            }
            if let Some(limit) = self.limit {
                sql.push_str(&format!(" LIMIT {}", limit.saturating_add(self.offset)));
            }
        }

        sql
    }
}
