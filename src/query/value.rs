//! Scalar values flowing through the merge phase.
//!
//! Workers answer with JSON rows; `Scalar` is the typed view of one JSON cell used for
//! arithmetic and ordering. Numeric strings (e.g. a `numeric` column rendered as text)
//! are accepted wherever a number is expected.

use serde_json::{Number, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
            },
            Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the value: ints and floats as-is, numeric text parsed.
    pub fn to_numeric(&self) -> Option<Scalar> {
        match self {
            Scalar::Int(_) | Scalar::Float(_) => Some(self.clone()),
            Scalar::Text(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.to_numeric()? {
            Scalar::Int(i) => Some(i as f64),
            Scalar::Float(f) => Some(f),
            _ => None,
        }
    }
}

/// Parses an SQL/JSON numeric literal, preferring an exact integer.
pub fn parse_number(s: &str) -> Option<Scalar> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Scalar::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Scalar::Float)
}

/// SQL comparison: `None` when either side is NULL or the types are incomparable.
pub fn sql_compare(a: &Scalar, b: &Scalar) -> Option<Ordering> {
    match (a, b) {
        (Scalar::Null, _) | (_, Scalar::Null) => None,
        (Scalar::Int(x), Scalar::Int(y)) => Some(x.cmp(y)),
        (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(y)),
        (Scalar::Text(x), Scalar::Text(y)) => Some(x.cmp(y)),
        _ => {
            let x = a.as_f64()?;
            let y = b.as_f64()?;
            x.partial_cmp(&y)
        }
    }
}

/// Total order used for sorting merged rows. NULL sorts below everything; values of
/// incomparable types fall back to a fixed type rank so the sort stays deterministic.
pub fn total_compare(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Null, Scalar::Null) => Ordering::Equal,
        (Scalar::Null, _) => Ordering::Less,
        (_, Scalar::Null) => Ordering::Greater,
        _ => sql_compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

fn type_rank(s: &Scalar) -> u8 {
    match s {
        Scalar::Null => 0,
        Scalar::Bool(_) => 1,
        Scalar::Int(_) | Scalar::Float(_) => 2,
        Scalar::Text(_) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_prefers_integers() {
        assert_eq!(Scalar::from_json(&json!(42)), Scalar::Int(42));
        assert_eq!(Scalar::from_json(&json!(2.5)), Scalar::Float(2.5));
        assert_eq!(Scalar::from_json(&json!(null)), Scalar::Null);
        assert_eq!(Scalar::from_json(&json!("abc")), Scalar::Text("abc".into()));
    }

    #[test]
    fn test_numeric_text_is_numeric() {
        assert_eq!(
            Scalar::Text("12345".into()).to_numeric(),
            Some(Scalar::Int(12345))
        );
        assert_eq!(Scalar::Text("1.5".into()).as_f64(), Some(1.5));
        assert_eq!(Scalar::Text("abc".into()).to_numeric(), None);
    }

    #[test]
    fn test_sql_compare_mixed_numeric() {
        assert_eq!(
            sql_compare(&Scalar::Int(2), &Scalar::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(sql_compare(&Scalar::Null, &Scalar::Int(1)), None);
    }

    #[test]
    fn test_total_compare_nulls_first() {
        assert_eq!(total_compare(&Scalar::Null, &Scalar::Int(0)), Ordering::Less);
        assert_eq!(
            total_compare(&Scalar::Int(1), &Scalar::Text("a".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_non_finite_float_serializes_as_null() {
        assert_eq!(Scalar::Float(f64::INFINITY).to_json(), Value::Null);
    }
}
