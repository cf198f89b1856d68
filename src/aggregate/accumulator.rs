use crate::query::types::AggregateFn;
use crate::query::value::{Scalar, sql_compare, total_compare};
use serde_json::Value;
use std::cmp::Ordering;

/// Arithmetic overflow while combining partials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Running SUM: integer until a float shows up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sum {
    Empty,
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, value: &Value) -> Result<Sum, Overflow> {
        if beyond_i64(value) {
            return Err(Overflow);
        }
        let Some(incoming) = Scalar::from_json(value).to_numeric() else {
            return Ok(self);
        };

        let merged = match (self, incoming) {
            (Sum::Empty, Scalar::Int(i)) => Sum::Int(i),
            (Sum::Empty, Scalar::Float(f)) => Sum::Float(f),
            (Sum::Int(a), Scalar::Int(b)) => Sum::Int(a.checked_add(b).ok_or(Overflow)?),
            (Sum::Int(a), Scalar::Float(b)) => Sum::Float(a as f64 + b),
            (Sum::Float(a), Scalar::Int(b)) => Sum::Float(a + b as f64),
            (Sum::Float(a), Scalar::Float(b)) => Sum::Float(a + b),
            (current, _) => current,
        };

        match merged {
            Sum::Float(f) if !f.is_finite() => Err(Overflow),
            other => Ok(other),
        }
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            Sum::Empty => None,
            Sum::Int(i) => Some(i as f64),
            Sum::Float(f) => Some(f),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Sum::Empty => Value::Null,
            Sum::Int(i) => Scalar::Int(i).to_json(),
            Sum::Float(f) => Scalar::Float(f).to_json(),
        }
    }
}

/// Whole numbers outside the i64 range. JSON decoding would turn these into
/// inexact floats, so they are rejected instead of summed.
fn beyond_i64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.as_i64().is_none() => {
            n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.abs() >= I64_BOUND)
        }
        Value::String(s) => {
            let text = s.trim();
            let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
            !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
                && text.parse::<i64>().is_err()
        }
        _ => false,
    }
}

/// 2^63.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Integer value of a partial count. NULL counts as zero.
fn partial_count(value: &Value) -> Result<i64, Overflow> {
    match Scalar::from_json(value).to_numeric() {
        Some(Scalar::Int(i)) => Ok(i),
        Some(Scalar::Float(f)) if f.fract() == 0.0 => {
            if f.abs() < i64::MAX as f64 {
                Ok(f as i64)
            } else {
                Err(Overflow)
            }
        }
        _ => Ok(0),
    }
}

/// Second-phase state of one aggregate column in one group.
#[derive(Debug, Clone)]
pub enum Accumulator {
    Count(i64),
    Sum(Sum),
    Avg { sum: Sum, count: i64 },
    Min(Option<(Scalar, Value)>),
    Max(Option<(Scalar, Value)>),
}

impl Accumulator {
    pub fn new(func: AggregateFn) -> Self {
        match func {
            AggregateFn::Count => Accumulator::Count(0),
            AggregateFn::Sum => Accumulator::Sum(Sum::Empty),
            AggregateFn::Avg => Accumulator::Avg {
                sum: Sum::Empty,
                count: 0,
            },
            AggregateFn::Min => Accumulator::Min(None),
            AggregateFn::Max => Accumulator::Max(None),
        }
    }

    /// Folds one partial value in. AVG takes the partial sum and partial count.
    pub fn merge(&mut self, value: &Value, avg_count: Option<&Value>) -> Result<(), Overflow> {
        match self {
            Accumulator::Count(n) => {
                *n = n.checked_add(partial_count(value)?).ok_or(Overflow)?;
            }
            Accumulator::Sum(state) => {
                *state = state.add(value)?;
            }
            Accumulator::Avg { sum, count } => {
                *sum = sum.add(value)?;
                let partial = avg_count.map(partial_count).transpose()?.unwrap_or(0);
                *count = count.checked_add(partial).ok_or(Overflow)?;
            }
            Accumulator::Min(best) => keep_extreme(best, value, Ordering::Less),
            Accumulator::Max(best) => keep_extreme(best, value, Ordering::Greater),
        }
        Ok(())
    }

    pub fn finish(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::from(*n),
            Accumulator::Sum(state) => state.to_json(),
            Accumulator::Avg { sum, count } => match (sum.as_f64(), *count) {
                (Some(total), count) if count > 0 => Scalar::Float(total / count as f64).to_json(),
                _ => Value::Null,
            },
            Accumulator::Min(best) | Accumulator::Max(best) => best
                .as_ref()
                .map(|(_, original)| original.clone())
                .unwrap_or(Value::Null),
        }
    }
}

/// Partitions that saw no rows report NULL extrema; those never win.
fn keep_extreme(best: &mut Option<(Scalar, Value)>, value: &Value, wanted: Ordering) {
    let incoming = Scalar::from_json(value);
    if incoming.is_null() {
        return;
    }

    let replace = match best {
        None => true,
        Some((current, _)) => {
            let ordering = sql_compare(&incoming, current)
                .unwrap_or_else(|| total_compare(&incoming, current));
            ordering == wanted
        }
    };

    if replace {
        *best = Some((incoming, value.clone()));
    }
}
