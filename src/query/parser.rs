//! SQL parsing and structural classification.
//!
//! Turns raw SQL into a `ParsedQuery`: validates that the statement is a single SELECT the
//! dispatcher can split and merge, decomposes aggregates into mergeable partials
//! (AVG becomes SUM + COUNT), resolves GROUP BY / ORDER BY / HAVING references onto output
//! columns, and extracts the key range used for range partitioning.

use super::predicate::{ArithOp, CompareOp, Operand, Predicate};
use super::types::{
    AggregateFn, ColumnSource, KeyRange, OrderKey, OutputColumn, ParsedQuery, QueryFeatures,
    QueryKind,
};
use super::value::{Scalar, parse_number};
use crate::error::DispatchError;

use sqlparser::ast::{
    BinaryOperator, Distinct, DuplicateTreatment, Expr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Query, SelectItem, SetExpr, Statement, TableFactor,
    UnaryOperator, Value, visit_expressions,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

fn unsupported(what: impl Into<String>) -> DispatchError {
    DispatchError::UnsupportedQuery(what.into())
}

/// Parses and classifies one SELECT statement.
///
/// `split_column` names the integer key used for range/hash partitioning.
pub fn parse_query(sql: &str, split_column: &str) -> Result<ParsedQuery, DispatchError> {
    let text = sql.trim();
    if text.is_empty() {
        return Err(DispatchError::Parse("empty query".to_string()));
    }

    let statements = Parser::parse_sql(&GenericDialect {}, text)
        .map_err(|e| DispatchError::Parse(e.to_string()))?;

    let statement = match statements.as_slice() {
        [statement] => statement,
        [] => return Err(DispatchError::Parse("empty query".to_string())),
        _ => return Err(unsupported("multiple statements in one request")),
    };

    let Statement::Query(query) = statement else {
        return Err(unsupported(format!(
            "only SELECT statements are accepted, got {}",
            statement_keyword(statement)
        )));
    };

    classify(text, query, split_column)
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn classify(sql: &str, query: &Query, split_column: &str) -> Result<ParsedQuery, DispatchError> {
    if query.with.is_some() {
        return Err(unsupported("common table expressions (WITH)"));
    }
    if query.fetch.is_some() {
        return Err(unsupported("FETCH clauses"));
    }
    if !query.locks.is_empty() {
        return Err(unsupported("locking clauses"));
    }

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        SetExpr::Query(_) => return Err(unsupported("nested subqueries")),
        _ => return Err(unsupported("set operations (UNION/INTERSECT/EXCEPT)")),
    };

    reject_nested_constructs(query)?;

    if select.top.is_some() {
        return Err(unsupported("TOP clauses"));
    }
    if select.into.is_some() {
        return Err(unsupported("SELECT INTO"));
    }

    let distinct = match &select.distinct {
        None => false,
        Some(Distinct::Distinct) => true,
        Some(Distinct::On(_)) => return Err(unsupported("DISTINCT ON")),
    };

    // FROM: driving table first, joins flagged.
    let mut qualifiers: Vec<String> = Vec::new();
    let mut relation = None;
    let mut has_join = false;
    let from_sql = if select.from.is_empty() {
        None
    } else {
        for table in &select.from {
            check_table_factor(&table.relation)?;
            for join in &table.joins {
                check_table_factor(&join.relation)?;
            }
        }
        has_join = select.from.len() > 1 || select.from.iter().any(|t| !t.joins.is_empty());

        if let TableFactor::Table { name, alias, .. } = &select.from[0].relation {
            let full_name = name.to_string();
            let short_name = full_name
                .rsplit('.')
                .next()
                .unwrap_or(full_name.as_str())
                .to_string();
            if let Some(alias) = alias {
                qualifiers.push(alias.name.value.clone());
            }
            qualifiers.push(short_name);
            relation = Some(full_name);
        }

        Some(
            select
                .from
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    let split_key = match (has_join, qualifiers.first()) {
        (true, Some(qualifier)) => format!("{}.{}", qualifier, split_column),
        _ => split_column.to_string(),
    };

    // Projection.
    let mut layout = Layout::default();
    let has_wildcard = select
        .projection
        .iter()
        .any(|item| matches!(item, SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)));

    let wildcard = if has_wildcard {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    reject_aggregates_in_wildcard(expr)?;
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    reject_aggregates_in_wildcard(expr)?;
                    layout
                        .wildcard_aliases
                        .push((alias.value.clone(), expr.to_string()));
                }
                _ => {}
            }
        }
        Some(
            select
                .projection
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )
    } else {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => layout.push_projection(expr, None)?,
                SelectItem::ExprWithAlias { expr, alias } => {
                    layout.push_projection(expr, Some(alias.value.clone()))?
                }
                _ => {}
            }
        }
        None
    };

    // GROUP BY.
    let group_exprs = match &select.group_by {
        GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                return Err(unsupported("GROUP BY modifiers (ROLLUP/CUBE/TOTALS)"));
            }
            exprs.as_slice()
        }
        GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
    };
    if wildcard.is_some() && !group_exprs.is_empty() {
        return Err(unsupported("GROUP BY with a wildcard projection"));
    }
    let mut group_by = Vec::with_capacity(group_exprs.len());
    for expr in group_exprs {
        let sql = layout.resolve_group_expr(expr)?;
        layout.value_column(&sql, "g");
        group_by.push(sql);
    }

    // HAVING.
    let having = match &select.having {
        Some(expr) => Some(layout.convert_predicate(expr)?),
        None => None,
    };

    // ORDER BY.
    let mut order_by = Vec::new();
    if let Some(order) = &query.order_by {
        for item in &order.exprs {
            let (column, pushdown) = layout.resolve_order_expr(&item.expr)?;
            order_by.push(OrderKey {
                column,
                pushdown,
                descending: item.asc == Some(false),
                nulls_first: item.nulls_first,
            });
        }
    }

    let limit = match &query.limit {
        Some(expr) => Some(literal_count(expr, "LIMIT")?),
        None => None,
    };
    let offset = match &query.offset {
        Some(offset) => literal_count(&offset.value, "OFFSET")?,
        None => 0,
    };

    let has_aggregate = layout.columns.iter().any(|c| c.is_aggregate());
    let has_group_by = !group_by.is_empty();
    if having.is_some() && !(has_aggregate || has_group_by) {
        return Err(unsupported("HAVING without aggregation"));
    }

    let range = match (&select.selection, &from_sql) {
        (Some(filter), Some(_)) => extract_range(filter, split_column, &qualifiers),
        _ => None,
    };

    let features = QueryFeatures {
        has_join,
        has_group_by,
        has_order_by: !order_by.is_empty(),
        has_having: having.is_some(),
        has_aggregate,
        has_limit: limit.is_some(),
        range,
    };

    let kind = classify_kind(&layout.columns, has_group_by);

    Ok(ParsedQuery {
        sql: sql.to_string(),
        kind,
        relation,
        from_sql,
        filter: select.selection.as_ref().map(|e| e.to_string()),
        group_by,
        having,
        order_by,
        limit,
        offset,
        distinct,
        wildcard,
        columns: layout.columns,
        split_key,
        features,
    })
}

fn classify_kind(columns: &[OutputColumn], has_group_by: bool) -> QueryKind {
    if has_group_by {
        return QueryKind::GroupBy;
    }
    let functions: Vec<AggregateFn> = columns
        .iter()
        .filter(|c| !c.hidden)
        .filter_map(|c| match &c.source {
            ColumnSource::Aggregate { func, .. } => Some(*func),
            ColumnSource::Value { .. } => None,
        })
        .collect();

    match functions.first() {
        None => QueryKind::Select,
        Some(first) if functions.iter().all(|f| f == first) => QueryKind::Aggregate(*first),
        Some(_) => QueryKind::MultiAggregate,
    }
}

fn reject_nested_constructs(query: &Query) -> Result<(), DispatchError> {
    let found = visit_expressions(query, |expr| match expr {
        Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => {
            ControlFlow::Break("nested subqueries")
        }
        Expr::Function(f) if f.over.is_some() => ControlFlow::Break("window functions"),
        Expr::Function(f) if matches!(f.args, FunctionArguments::Subquery(_)) => {
            ControlFlow::Break("nested subqueries")
        }
        Expr::Rollup(_) | Expr::Cube(_) | Expr::GroupingSets(_) => {
            ControlFlow::Break("ROLLUP, CUBE and GROUPING SETS")
        }
        _ => ControlFlow::Continue(()),
    });

    match found {
        ControlFlow::Break(what) => Err(unsupported(what)),
        ControlFlow::Continue(()) => Ok(()),
    }
}

fn check_table_factor(factor: &TableFactor) -> Result<(), DispatchError> {
    match factor {
        TableFactor::Table { args: None, .. } => Ok(()),
        TableFactor::Table { .. } => Err(unsupported("table-valued functions")),
        TableFactor::Derived { .. } => Err(unsupported("nested subqueries")),
        other => Err(unsupported(format!("FROM item '{}'", other))),
    }
}

fn reject_aggregates_in_wildcard(expr: &Expr) -> Result<(), DispatchError> {
    if contains_aggregate(expr) {
        return Err(unsupported("aggregates mixed with a wildcard projection"));
    }
    Ok(())
}

fn contains_aggregate(expr: &Expr) -> bool {
    visit_expressions(expr, |e| match e {
        Expr::Function(f) if AggregateFn::from_name(&f.name.to_string()).is_some() => {
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(()),
    })
    .is_break()
}

/// `Some((func, arg))` when the expression is exactly one mergeable aggregate call.
fn as_aggregate(expr: &Expr) -> Result<Option<(AggregateFn, Option<String>)>, DispatchError> {
    let Expr::Function(f) = expr else {
        return Ok(None);
    };
    let name = f.name.to_string();
    let Some(func) = AggregateFn::from_name(&name) else {
        return Ok(None);
    };
    if f.filter.is_some() {
        return Err(unsupported("aggregate FILTER clauses"));
    }

    let FunctionArguments::List(list) = &f.args else {
        return Err(unsupported(format!("{} without an argument list", name)));
    };
    if matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct)) {
        return Err(unsupported(
            "DISTINCT aggregates cannot be merged across partitions",
        ));
    }
    if !list.clauses.is_empty() {
        return Err(unsupported(format!("clauses inside {}(...)", name)));
    }

    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] if func == AggregateFn::Count => {
            Ok(Some((func, None)))
        }
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] => {
            if contains_aggregate(arg) {
                return Err(unsupported("nested aggregate functions"));
            }
            Ok(Some((func, Some(arg.to_string()))))
        }
        _ => Err(unsupported(format!("arguments of {}", expr))),
    }
}

fn default_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|p| p.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        Expr::Function(f) => f.name.to_string().to_lowercase(),
        _ => expr.to_string(),
    }
}

fn literal_count(expr: &Expr, clause: &str) -> Result<u64, DispatchError> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n
            .parse::<u64>()
            .map_err(|_| DispatchError::Parse(format!("invalid {} value '{}'", clause, n))),
        other => Err(unsupported(format!("non-literal {} '{}'", clause, other))),
    }
}

fn ordinal(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse::<usize>().ok(),
        _ => None,
    }
}

/// Output columns under construction, plus the lookups that resolve GROUP BY,
/// ORDER BY and HAVING references onto them.
#[derive(Default)]
struct Layout {
    columns: Vec<OutputColumn>,
    /// `(alias, expression)` pairs of a wildcard projection.
    wildcard_aliases: Vec<(String, String)>,
    hidden_seq: usize,
}

impl Layout {
    fn visible_count(&self) -> usize {
        self.columns.iter().filter(|c| !c.hidden).count()
    }

    fn push_projection(&mut self, expr: &Expr, alias: Option<String>) -> Result<(), DispatchError> {
        let name = alias.unwrap_or_else(|| default_name(expr));
        let source = match as_aggregate(expr)? {
            Some((func, arg)) => ColumnSource::Aggregate { func, arg },
            None if contains_aggregate(expr) => {
                return Err(unsupported(format!(
                    "aggregate nested inside expression '{}'",
                    expr
                )));
            }
            None => ColumnSource::Value {
                sql: expr.to_string(),
            },
        };

        let key = format!("_p{}", self.columns.len());
        self.columns.push(OutputColumn {
            name,
            key,
            source,
            hidden: false,
        });
        Ok(())
    }

    fn push_hidden(&mut self, prefix: &str, source: ColumnSource) -> String {
        let key = format!("_{}{}", prefix, self.hidden_seq);
        self.hidden_seq += 1;
        self.columns.push(OutputColumn {
            name: key.clone(),
            key: key.clone(),
            source,
            hidden: true,
        });
        key
    }

    fn find_visible_by_name(&self, name: &str) -> Option<&OutputColumn> {
        self.columns
            .iter()
            .find(|c| !c.hidden && c.name.eq_ignore_ascii_case(name))
    }

    /// Name of the column carrying `sql` as a plain value, adding a hidden one if needed.
    fn value_column(&mut self, sql: &str, prefix: &str) -> String {
        let existing = self.columns.iter().find(|c| match &c.source {
            ColumnSource::Value { sql: s } => s == sql,
            ColumnSource::Aggregate { .. } => false,
        });
        match existing {
            Some(column) => column.name.clone(),
            None => self.push_hidden(
                prefix,
                ColumnSource::Value {
                    sql: sql.to_string(),
                },
            ),
        }
    }

    fn aggregate_column(&mut self, func: AggregateFn, arg: Option<String>) -> String {
        let existing = self.columns.iter().find(|c| match &c.source {
            ColumnSource::Aggregate { func: f, arg: a } => *f == func && *a == arg,
            ColumnSource::Value { .. } => false,
        });
        match existing {
            Some(column) => column.name.clone(),
            None => self.push_hidden("h", ColumnSource::Aggregate { func, arg }),
        }
    }

    fn resolve_group_expr(&self, expr: &Expr) -> Result<String, DispatchError> {
        if let Some(n) = ordinal(expr) {
            let column = n
                .checked_sub(1)
                .filter(|&i| i < self.visible_count())
                .map(|i| &self.columns[i])
                .ok_or_else(|| DispatchError::Parse(format!("GROUP BY position {} is out of range", n)))?;
            return match &column.source {
                ColumnSource::Value { sql } => Ok(sql.clone()),
                ColumnSource::Aggregate { .. } => Err(unsupported("GROUP BY an aggregate")),
            };
        }

        if let Expr::Identifier(ident) = expr
            && let Some(column) = self.find_visible_by_name(&ident.value)
        {
            return match &column.source {
                ColumnSource::Value { sql } => Ok(sql.clone()),
                ColumnSource::Aggregate { .. } => Err(unsupported("GROUP BY an aggregate")),
            };
        }

        if contains_aggregate(expr) {
            return Err(unsupported("GROUP BY an aggregate"));
        }
        Ok(expr.to_string())
    }

    /// Returns `(merged column name, per-worker ORDER BY expression)`.
    fn resolve_order_expr(&mut self, expr: &Expr) -> Result<(String, String), DispatchError> {
        if let Some(n) = ordinal(expr) {
            if !self.wildcard_aliases.is_empty() || self.visible_count() == 0 {
                return Err(unsupported("ORDER BY position with a wildcard projection"));
            }
            let column = n
                .checked_sub(1)
                .filter(|&i| i < self.visible_count())
                .map(|i| &self.columns[i])
                .ok_or_else(|| DispatchError::Parse(format!("ORDER BY position {} is out of range", n)))?;
            return Ok((column.name.clone(), column.key.clone()));
        }

        if self.visible_count() == 0 {
            // Wildcard projection: rows keep the worker's column names.
            if let Expr::Identifier(ident) = expr {
                if let Some((alias, _)) = self
                    .wildcard_aliases
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(&ident.value))
                {
                    return Ok((alias.clone(), ident.to_string()));
                }
                return Ok((ident.value.clone(), ident.to_string()));
            }
            if let Expr::CompoundIdentifier(parts) = expr
                && let Some(last) = parts.last()
            {
                return Ok((last.value.clone(), expr.to_string()));
            }
            let text = expr.to_string();
            if let Some((alias, _)) = self.wildcard_aliases.iter().find(|(_, sql)| *sql == text) {
                return Ok((alias.clone(), alias.clone()));
            }
            if contains_aggregate(expr) {
                return Err(unsupported("aggregates mixed with a wildcard projection"));
            }
            let key = self.value_column(&text, "o");
            return Ok((key.clone(), key));
        }

        if let Expr::Identifier(ident) = expr
            && let Some(column) = self.find_visible_by_name(&ident.value)
        {
            return Ok((column.name.clone(), column.key.clone()));
        }

        if let Some((func, arg)) = as_aggregate(expr)? {
            let name = self.aggregate_column(func, arg);
            let key = self.key_of(&name);
            return Ok((name, key));
        }
        if contains_aggregate(expr) {
            return Err(unsupported(format!(
                "aggregate nested inside ORDER BY expression '{}'",
                expr
            )));
        }

        let name = self.value_column(&expr.to_string(), "o");
        let key = self.key_of(&name);
        Ok((name, key))
    }

    fn key_of(&self, name: &str) -> String {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.key.clone())
            .unwrap_or_else(|| name.to_string())
    }

    fn convert_predicate(&mut self, expr: &Expr) -> Result<Predicate, DispatchError> {
        match expr {
            Expr::Nested(inner) => self.convert_predicate(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(Predicate::And(
                Box::new(self.convert_predicate(left)?),
                Box::new(self.convert_predicate(right)?),
            )),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Ok(Predicate::Or(
                Box::new(self.convert_predicate(left)?),
                Box::new(self.convert_predicate(right)?),
            )),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Predicate::Not(Box::new(self.convert_predicate(expr)?))),
            Expr::BinaryOp { left, op, right } => {
                let op = compare_op(op).ok_or_else(|| {
                    unsupported(format!("HAVING condition '{}'", expr))
                })?;
                Ok(Predicate::Compare {
                    left: self.convert_operand(left)?,
                    op,
                    right: self.convert_operand(right)?,
                })
            }
            Expr::IsNull(inner) => Ok(Predicate::IsNull {
                operand: self.convert_operand(inner)?,
                negated: false,
            }),
            Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
                operand: self.convert_operand(inner)?,
                negated: true,
            }),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Predicate::Between {
                operand: self.convert_operand(expr)?,
                low: self.convert_operand(low)?,
                high: self.convert_operand(high)?,
                negated: *negated,
            }),
            other => Err(unsupported(format!("HAVING condition '{}'", other))),
        }
    }

    fn convert_operand(&mut self, expr: &Expr) -> Result<Operand, DispatchError> {
        match expr {
            Expr::Nested(inner) => self.convert_operand(inner),
            Expr::Value(Value::Number(n, _)) => parse_number(n)
                .map(Operand::Literal)
                .ok_or_else(|| DispatchError::Parse(format!("invalid number '{}'", n))),
            Expr::Value(Value::SingleQuotedString(s)) => Ok(Operand::Literal(Scalar::Text(s.clone()))),
            Expr::Value(Value::Boolean(b)) => Ok(Operand::Literal(Scalar::Bool(*b))),
            Expr::Value(Value::Null) => Ok(Operand::Literal(Scalar::Null)),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: inner,
            } => match self.convert_operand(inner)? {
                Operand::Literal(Scalar::Int(i)) => Ok(Operand::Literal(
                    i.checked_neg().map(Scalar::Int).unwrap_or(Scalar::Null),
                )),
                Operand::Literal(Scalar::Float(f)) => Ok(Operand::Literal(Scalar::Float(-f))),
                other => Ok(Operand::Arith {
                    left: Box::new(Operand::Literal(Scalar::Int(0))),
                    op: ArithOp::Sub,
                    right: Box::new(other),
                }),
            },
            Expr::BinaryOp { left, op, right } if arith_op(op).is_some() => {
                let op = arith_op(op).unwrap_or(ArithOp::Add);
                Ok(Operand::Arith {
                    left: Box::new(self.convert_operand(left)?),
                    op,
                    right: Box::new(self.convert_operand(right)?),
                })
            }
            _ => {
                if let Some((func, arg)) = as_aggregate(expr)? {
                    return Ok(Operand::Column(self.aggregate_column(func, arg)));
                }
                if let Expr::Identifier(ident) = expr
                    && let Some(column) = self.find_visible_by_name(&ident.value)
                {
                    return Ok(Operand::Column(column.name.clone()));
                }
                let text = expr.to_string();
                let grouped = self.columns.iter().find(|c| match &c.source {
                    ColumnSource::Value { sql } => *sql == text,
                    ColumnSource::Aggregate { .. } => false,
                });
                match grouped {
                    Some(column) => Ok(Operand::Column(column.name.clone())),
                    None => Err(unsupported(format!(
                        "HAVING references '{}' which is neither grouped nor aggregated",
                        text
                    ))),
                }
            }
        }
    }
}

fn compare_op(op: &BinaryOperator) -> Option<CompareOp> {
    match op {
        BinaryOperator::Eq => Some(CompareOp::Eq),
        BinaryOperator::NotEq => Some(CompareOp::NotEq),
        BinaryOperator::Lt => Some(CompareOp::Lt),
        BinaryOperator::LtEq => Some(CompareOp::LtEq),
        BinaryOperator::Gt => Some(CompareOp::Gt),
        BinaryOperator::GtEq => Some(CompareOp::GtEq),
        _ => None,
    }
}

fn arith_op(op: &BinaryOperator) -> Option<ArithOp> {
    match op {
        BinaryOperator::Plus => Some(ArithOp::Add),
        BinaryOperator::Minus => Some(ArithOp::Sub),
        BinaryOperator::Multiply => Some(ArithOp::Mul),
        BinaryOperator::Divide => Some(ArithOp::Div),
        BinaryOperator::Modulo => Some(ArithOp::Mod),
        _ => None,
    }
}

// --- Range extraction ---

#[derive(Default)]
struct Bounds {
    low: Option<i64>,
    high: Option<i64>,
}

impl Bounds {
    fn lower(&mut self, v: i64) {
        self.low = Some(self.low.map_or(v, |l| l.max(v)));
    }

    fn upper(&mut self, v: i64) {
        self.high = Some(self.high.map_or(v, |h| h.min(v)));
    }
}

/// Bounded inclusive range on the split column implied by the top-level AND-chain of
/// the filter. Disjunctions are never used; both ends must be known.
pub fn extract_range(filter: &Expr, column: &str, qualifiers: &[String]) -> Option<KeyRange> {
    let mut parts = Vec::new();
    conjuncts(filter, &mut parts);

    let mut bounds = Bounds::default();
    for part in parts {
        apply_bound(part, column, qualifiers, &mut bounds);
    }

    match (bounds.low, bounds.high) {
        (Some(low), Some(high)) if low <= high => Some(KeyRange { low, high }),
        _ => None,
    }
}

fn conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        Expr::Nested(inner) => conjuncts(inner, out),
        other => out.push(other),
    }
}

fn is_split_column(expr: &Expr, column: &str, qualifiers: &[String]) -> bool {
    match expr {
        Expr::Identifier(ident) => ident.value.eq_ignore_ascii_case(column),
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [qualifier, name] => {
                name.value.eq_ignore_ascii_case(column)
                    && qualifiers
                        .iter()
                        .any(|q| q.eq_ignore_ascii_case(&qualifier.value))
            }
            _ => false,
        },
        Expr::Nested(inner) => is_split_column(inner, column, qualifiers),
        _ => false,
    }
}

fn int_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => int_literal(expr)?.checked_neg(),
        Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        } => int_literal(expr),
        Expr::Nested(inner) => int_literal(inner),
        _ => None,
    }
}

fn apply_bound(expr: &Expr, column: &str, qualifiers: &[String], bounds: &mut Bounds) {
    match expr {
        Expr::Between {
            expr,
            negated: false,
            low,
            high,
        } if is_split_column(expr, column, qualifiers) => {
            if let (Some(low), Some(high)) = (int_literal(low), int_literal(high)) {
                bounds.lower(low);
                bounds.upper(high);
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let (op, value) = if is_split_column(left, column, qualifiers) {
                match int_literal(right) {
                    Some(v) => (compare_op(op), v),
                    None => return,
                }
            } else if is_split_column(right, column, qualifiers) {
                match int_literal(left) {
                    Some(v) => (compare_op(op).map(flip), v),
                    None => return,
                }
            } else {
                return;
            };

            match op {
                Some(CompareOp::Gt) => {
                    if let Some(v) = value.checked_add(1) {
                        bounds.lower(v);
                    }
                }
                Some(CompareOp::GtEq) => bounds.lower(value),
                Some(CompareOp::Lt) => {
                    if let Some(v) = value.checked_sub(1) {
                        bounds.upper(v);
                    }
                }
                Some(CompareOp::LtEq) => bounds.upper(value),
                Some(CompareOp::Eq) => {
                    bounds.lower(value);
                    bounds.upper(value);
                }
                Some(CompareOp::NotEq) | None => {}
            }
        }
        _ => {}
    }
}

/// Mirrors a comparison so that the column is on the left: `5 < id` is `id > 5`.
fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        other => other,
    }
}
