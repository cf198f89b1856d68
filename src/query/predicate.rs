//! Post-merge predicates (HAVING).
//!
//! HAVING cannot be pushed to workers because a partial group may not satisfy the
//! condition while the merged group does. It is therefore compiled at parse time into this
//! small typed form and evaluated by the aggregator against merged rows, using SQL
//! three-valued logic (`None` is UNKNOWN).

use super::types::Row;
use super::value::{Scalar, sql_compare};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column of the merged row, by name.
    Column(String),
    Literal(Scalar),
    Arith {
        left: Box<Operand>,
        op: ArithOp,
        right: Box<Operand>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
        negated: bool,
    },
}

impl Predicate {
    pub fn evaluate(&self, row: &Row) -> Option<bool> {
        match self {
            Predicate::And(a, b) => match (a.evaluate(row), b.evaluate(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(a, b) => match (a.evaluate(row), b.evaluate(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(inner) => inner.evaluate(row).map(|b| !b),
            Predicate::Compare { left, op, right } => {
                let ordering = sql_compare(&left.evaluate(row), &right.evaluate(row))?;
                Some(op.holds(ordering))
            }
            Predicate::IsNull { operand, negated } => {
                Some(operand.evaluate(row).is_null() != *negated)
            }
            Predicate::Between {
                operand,
                low,
                high,
                negated,
            } => {
                let value = operand.evaluate(row);
                let above = sql_compare(&value, &low.evaluate(row))? != Ordering::Less;
                let below = sql_compare(&value, &high.evaluate(row))? != Ordering::Greater;
                Some((above && below) != *negated)
            }
        }
    }

    /// Rows pass only when the predicate is TRUE (not FALSE or UNKNOWN).
    pub fn matches(&self, row: &Row) -> bool {
        self.evaluate(row) == Some(true)
    }
}

impl CompareOp {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl Operand {
    pub fn evaluate(&self, row: &Row) -> Scalar {
        match self {
            Operand::Column(name) => row.get(name).map(Scalar::from_json).unwrap_or(Scalar::Null),
            Operand::Literal(value) => value.clone(),
            Operand::Arith { left, op, right } => {
                arith(&left.evaluate(row), *op, &right.evaluate(row))
            }
        }
    }
}

fn arith(a: &Scalar, op: ArithOp, b: &Scalar) -> Scalar {
    let (Some(a), Some(b)) = (a.to_numeric(), b.to_numeric()) else {
        return Scalar::Null;
    };

    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => {
            let result = match op {
                ArithOp::Add => x.checked_add(y),
                ArithOp::Sub => x.checked_sub(y),
                ArithOp::Mul => x.checked_mul(y),
                ArithOp::Div => x.checked_div(y),
                ArithOp::Mod => x.checked_rem(y),
            };
            result.map(Scalar::Int).unwrap_or(Scalar::Null)
        }
        (a, b) => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Scalar::Null;
            };
            let result = match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div if y == 0.0 => return Scalar::Null,
                ArithOp::Div => x / y,
                ArithOp::Mod if y == 0.0 => return Scalar::Null,
                ArithOp::Mod => x % y,
            };
            if result.is_finite() {
                Scalar::Float(result)
            } else {
                Scalar::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn gt(column: &str, literal: i64) -> Predicate {
        Predicate::Compare {
            left: Operand::Column(column.into()),
            op: CompareOp::Gt,
            right: Operand::Literal(Scalar::Int(literal)),
        }
    }

    #[test]
    fn test_compare_against_column() {
        let r = row(json!({"c": 6000}));
        assert!(gt("c", 5000).matches(&r));
        assert!(!gt("c", 99999).matches(&r));
    }

    #[test]
    fn test_null_comparison_is_unknown_and_filtered() {
        let r = row(json!({"c": null}));
        assert_eq!(gt("c", 1).evaluate(&r), None);
        assert!(!gt("c", 1).matches(&r));
        assert!(!Predicate::Not(Box::new(gt("c", 1))).matches(&r));
    }

    #[test]
    fn test_kleene_logic() {
        let r = row(json!({"a": 10, "b": null}));
        let or = Predicate::Or(Box::new(gt("a", 5)), Box::new(gt("b", 5)));
        let and = Predicate::And(Box::new(gt("a", 50)), Box::new(gt("b", 5)));
        assert_eq!(or.evaluate(&r), Some(true));
        assert_eq!(and.evaluate(&r), Some(false));
    }

    #[test]
    fn test_arithmetic_operand() {
        // SUM(x) / COUNT(x) > 3
        let predicate = Predicate::Compare {
            left: Operand::Arith {
                left: Box::new(Operand::Column("s".into())),
                op: ArithOp::Div,
                right: Box::new(Operand::Column("n".into())),
            },
            op: CompareOp::Gt,
            right: Operand::Literal(Scalar::Int(3)),
        };
        assert!(predicate.matches(&row(json!({"s": 40, "n": 10}))));
        assert!(!predicate.matches(&row(json!({"s": 30, "n": 10}))));
        assert!(!predicate.matches(&row(json!({"s": 30, "n": 0}))));
    }

    #[test]
    fn test_between_and_is_null() {
        let r = row(json!({"m": 4, "x": null}));
        let between = Predicate::Between {
            operand: Operand::Column("m".into()),
            low: Operand::Literal(Scalar::Int(1)),
            high: Operand::Literal(Scalar::Int(4)),
            negated: false,
        };
        assert!(between.matches(&r));
        let is_null = Predicate::IsNull {
            operand: Operand::Column("x".into()),
            negated: false,
        };
        assert!(is_null.matches(&r));
    }
}
