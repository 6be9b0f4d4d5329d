//! Typed scalar values (component A): ordering, nullity and hashing.
//!
//! Every variant carries its payload as `Option<T>`; `None` is that type's
//! designated null instance. Values of different variants are never equal
//! and never comparable — callers that need that must check `value_type()`
//! first (this is what `QueryFilter` comparison ops do, see `filter.rs`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// The type tag of a [`Value`], independent of nullity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Number,
    Text,
    Date,
    DateTime,
    TimeOfDay,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Text => "string",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
            ValueType::TimeOfDay => "timeofday",
        };
        f.write_str(s)
    }
}

/// A typed scalar value. `None` payloads are the type's null instance.
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(Option<bool>),
    Number(Option<f64>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
    TimeOfDay(Option<NaiveTime>),
}

impl Value {
    pub fn null(value_type: ValueType) -> Value {
        match value_type {
            ValueType::Boolean => Value::Boolean(None),
            ValueType::Number => Value::Number(None),
            ValueType::Text => Value::Text(None),
            ValueType::Date => Value::Date(None),
            ValueType::DateTime => Value::DateTime(None),
            ValueType::TimeOfDay => Value::TimeOfDay(None),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::TimeOfDay(_) => ValueType::TimeOfDay,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Boolean(v) => v.is_none(),
            Value::Number(v) => v.is_none(),
            Value::Text(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::DateTime(v) => v.is_none(),
            Value::TimeOfDay(v) => v.is_none(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Ordered comparison within a type. `None` (i.e. `Some(ValueType)`'s other types
    /// are incomparable — callers must check `value_type()` equality first for the
    /// ordering operators (§4.4); `None` is returned for mismatched variants.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => {
                Some(compare_option(a, b, |x, y| x.cmp(y)))
            }
            (Value::Number(a), Value::Number(b)) => {
                Some(compare_option(a, b, |x, y| cmp_f64(*x, *y)))
            }
            (Value::Text(a), Value::Text(b)) => Some(compare_option(a, b, |x, y| x.cmp(y))),
            (Value::Date(a), Value::Date(b)) => Some(compare_option(a, b, |x, y| x.cmp(y))),
            (Value::DateTime(a), Value::DateTime(b)) => {
                Some(compare_option(a, b, |x, y| x.cmp(y)))
            }
            (Value::TimeOfDay(a), Value::TimeOfDay(b)) => {
                Some(compare_option(a, b, |x, y| x.cmp(y)))
            }
            _ => None,
        }
    }

    /// String coercion used by the string comparison filter operators (§4.4).
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Boolean(None) => String::new(),
            Value::Boolean(Some(b)) => b.to_string(),
            Value::Number(None) => String::new(),
            Value::Number(Some(n)) => format_number(*n),
            Value::Text(None) => String::new(),
            Value::Text(Some(s)) => s.clone(),
            Value::Date(None) => String::new(),
            Value::Date(Some(d)) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(None) => String::new(),
            Value::DateTime(Some(dt)) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            Value::TimeOfDay(None) => String::new(),
            Value::TimeOfDay(Some(t)) => t.format("%H:%M:%S%.3f").to_string(),
        }
    }

    /// Renders the value as a query-string literal (§6 grammar). Used by
    /// `to_query_string` on filters and scalar-function arguments.
    pub fn to_query_literal(&self) -> Result<String, crate::error::QueryError> {
        match self {
            Value::Boolean(None) => Ok("null".to_string()),
            Value::Boolean(Some(b)) => Ok(b.to_string()),
            Value::Number(None) => Ok("null".to_string()),
            Value::Number(Some(n)) => Ok(format_number(*n)),
            Value::Text(None) => Ok("null".to_string()),
            Value::Text(Some(s)) => quote_string(s),
            Value::Date(None) => Ok("null".to_string()),
            Value::Date(Some(d)) => Ok(format!("DATE '{}'", d.format("%Y-%m-%d"))),
            Value::DateTime(None) => Ok("null".to_string()),
            Value::DateTime(Some(dt)) => {
                Ok(format!("DATETIME '{}'", dt.format("%Y-%m-%d %H:%M:%S")))
            }
            Value::TimeOfDay(None) => Ok("null".to_string()),
            Value::TimeOfDay(Some(t)) => Ok(format!("TIMEOFDAY '{}'", t.format("%H:%M:%S"))),
        }
    }
}

/// Picks single- or double-quoting; a literal containing both is unrepresentable (§6).
fn quote_string(s: &str) -> Result<String, crate::error::QueryError> {
    let has_single = s.contains('\'');
    let has_double = s.contains('"');
    if has_single && has_double {
        return Err(crate::error::QueryError::AmbiguousQuoting(s.to_string()));
    }
    if has_single {
        Ok(format!("\"{s}\""))
    } else {
        Ok(format!("'{s}'"))
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == n.trunc() && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn compare_option<T, F: Fn(&T, &T) -> Ordering>(a: &Option<T>, b: &Option<T>, cmp: F) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => cmp(x, y),
    }
}

/// IEEE double compare where NaN == NaN and NaN is greater than every
/// non-NaN value (§4.1) — the inverse convention from a raw bit-pattern
/// total order, so this is written out explicitly rather than derived from
/// `f64::total_cmp`.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).expect("neither operand is NaN"),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Boolean(v) => v.hash(state),
            Value::Number(v) => match v {
                None => 0u8.hash(state),
                Some(n) => {
                    1u8.hash(state);
                    // NaN must hash identically regardless of bit pattern,
                    // since `compare` treats every NaN as equal.
                    if n.is_nan() {
                        f64::NAN.to_bits().hash(state);
                    } else {
                        n.to_bits().hash(state);
                    }
                }
            },
            Value::Text(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::TimeOfDay(v) => v.hash(state),
        }
    }
}

/// Lexicographic order over value-lists (§4.6): shorter prefix ordered
/// element-wise by `compare`, ties broken by length with the longer list
/// greater. Centralised here because it drives aggregation-leaf ordering,
/// output column ordering and pivot-tuple set ordering (§9).
pub fn compare_value_lists(a: &[Value], b: &[Value]) -> Ordering {
    let shared = a.len().min(b.len());
    for i in 0..shared {
        match a[i].compare(&b[i]).unwrap_or(Ordering::Equal) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(Some(b))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Some(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Some(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Some(s.to_string()))
    }
}
