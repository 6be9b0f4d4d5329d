//! Scalar function library (component I): pure functions over [`Value`]s —
//! arithmetic, time-component extraction, date diff, text case, to-date
//! conversion and literal constants.
//!
//! Each function validates argument count and types (`return_type`) before
//! `evaluate` ever touches a value, mirroring the teacher's per-type
//! arithmetic helpers in its aggregation executor (`add_values` /
//! `min_value` / `max_value` / `divide_value`), generalised here to a
//! closed enum of named functions instead of inline match arms in the
//! aggregator.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{QueryError, QueryResult};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    /// Zero-arity function returning a fixed value. Used as a leaf operand
    /// for literals inside arithmetic expressions (§6 "constants").
    Constant(Value),
    Sum,
    Difference,
    Product,
    Quotient,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Quarter,
    DayOfWeek,
    DateDiff,
    Upper,
    Lower,
    ToDate,
}

impl ScalarFunction {
    /// The token used in canonical ids (`fn_a,b,c`) and in `fn(args)`
    /// call-syntax rendering. Arithmetic functions are not called through
    /// this path — see `infix_symbol`.
    pub fn code(&self) -> &'static str {
        match self {
            ScalarFunction::Constant(_) => "literal",
            ScalarFunction::Sum => "sum",
            ScalarFunction::Difference => "difference",
            ScalarFunction::Product => "product",
            ScalarFunction::Quotient => "quotient",
            ScalarFunction::Year => "year",
            ScalarFunction::Month => "month",
            ScalarFunction::Day => "day",
            ScalarFunction::Hour => "hour",
            ScalarFunction::Minute => "minute",
            ScalarFunction::Second => "second",
            ScalarFunction::Millisecond => "millisecond",
            ScalarFunction::Quarter => "quarter",
            ScalarFunction::DayOfWeek => "dayofweek",
            ScalarFunction::DateDiff => "datediff",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Lower => "lower",
            ScalarFunction::ToDate => "todate",
        }
    }

    /// `Some(symbol)` for the four arithmetic functions, which render as
    /// infix expressions per §6 rather than `fn(args)` call syntax.
    pub fn infix_symbol(&self) -> Option<&'static str> {
        match self {
            ScalarFunction::Sum => Some("+"),
            ScalarFunction::Difference => Some("-"),
            ScalarFunction::Product => Some("*"),
            ScalarFunction::Quotient => Some("/"),
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            ScalarFunction::Constant(_) => 0,
            ScalarFunction::Sum
            | ScalarFunction::Difference
            | ScalarFunction::Product
            | ScalarFunction::Quotient
            | ScalarFunction::DateDiff => 2,
            _ => 1,
        }
    }

    pub fn return_type(&self, arg_types: &[ValueType]) -> QueryResult<ValueType> {
        self.check_arity(arg_types.len())?;
        match self {
            ScalarFunction::Constant(v) => Ok(v.value_type()),
            ScalarFunction::Sum
            | ScalarFunction::Difference
            | ScalarFunction::Product
            | ScalarFunction::Quotient => {
                for t in arg_types {
                    require_numeric(*t)?;
                }
                Ok(ValueType::Number)
            }
            ScalarFunction::Year
            | ScalarFunction::Month
            | ScalarFunction::Day
            | ScalarFunction::Quarter
            | ScalarFunction::DayOfWeek => {
                require_one_of(arg_types[0], &[ValueType::Date, ValueType::DateTime])?;
                Ok(ValueType::Number)
            }
            ScalarFunction::Hour
            | ScalarFunction::Minute
            | ScalarFunction::Second
            | ScalarFunction::Millisecond => {
                require_one_of(
                    arg_types[0],
                    &[ValueType::TimeOfDay, ValueType::DateTime],
                )?;
                Ok(ValueType::Number)
            }
            ScalarFunction::DateDiff => {
                require_one_of(arg_types[0], &[ValueType::Date, ValueType::DateTime])?;
                require_one_of(arg_types[1], &[ValueType::Date, ValueType::DateTime])?;
                Ok(ValueType::Number)
            }
            ScalarFunction::Upper | ScalarFunction::Lower => {
                require_one_of(arg_types[0], &[ValueType::Text])?;
                Ok(ValueType::Text)
            }
            ScalarFunction::ToDate => {
                require_one_of(arg_types[0], &[ValueType::DateTime, ValueType::Number])?;
                Ok(ValueType::Date)
            }
        }
    }

    pub fn evaluate(&self, args: &[Value]) -> QueryResult<Value> {
        self.check_arity(args.len())?;
        match self {
            ScalarFunction::Constant(v) => Ok(v.clone()),
            ScalarFunction::Sum => numeric_binop(args, |a, b| a + b),
            ScalarFunction::Difference => numeric_binop(args, |a, b| a - b),
            ScalarFunction::Product => numeric_binop(args, |a, b| a * b),
            ScalarFunction::Quotient => numeric_binop(args, |a, b| a / b),
            ScalarFunction::Year => date_part(&args[0], |d| d.year() as f64),
            ScalarFunction::Month => date_part(&args[0], |d| d.month0() as f64),
            ScalarFunction::Day => date_part(&args[0], |d| d.day() as f64),
            ScalarFunction::Quarter => date_part(&args[0], |d| (d.month0() / 3) as f64),
            ScalarFunction::DayOfWeek => {
                date_part(&args[0], |d| d.weekday().num_days_from_sunday() as f64 + 1.0)
            }
            ScalarFunction::Hour => time_part(&args[0], |t| t.hour() as f64),
            ScalarFunction::Minute => time_part(&args[0], |t| t.minute() as f64),
            ScalarFunction::Second => time_part(&args[0], |t| t.second() as f64),
            ScalarFunction::Millisecond => {
                time_part(&args[0], |t| (t.nanosecond() / 1_000_000) as f64)
            }
            ScalarFunction::DateDiff => date_diff(&args[0], &args[1]),
            ScalarFunction::Upper => text_case(&args[0], str::to_uppercase),
            ScalarFunction::Lower => text_case(&args[0], str::to_lowercase),
            ScalarFunction::ToDate => to_date(&args[0]),
        }
    }

    fn check_arity(&self, n: usize) -> QueryResult<()> {
        if n != self.arity() {
            return Err(QueryError::InvalidQuery(format!(
                "{} expects {} argument(s), got {}",
                self.code(),
                self.arity(),
                n
            )));
        }
        Ok(())
    }
}

fn require_numeric(t: ValueType) -> QueryResult<()> {
    require_one_of(t, &[ValueType::Number])
}

fn require_one_of(t: ValueType, allowed: &[ValueType]) -> QueryResult<()> {
    if allowed.contains(&t) {
        Ok(())
    } else {
        Err(QueryError::InvalidQuery(format!(
            "expected one of {allowed:?}, got {t}"
        )))
    }
}

fn numeric_binop(args: &[Value], op: impl Fn(f64, f64) -> f64) -> QueryResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (&args[0], &args[1]) else {
        return Err(QueryError::InvalidQuery(
            "arithmetic function requires numeric arguments".to_string(),
        ));
    };
    match (a, b) {
        (Some(a), Some(b)) => Ok(Value::Number(Some(op(*a, *b)))),
        _ => Ok(Value::Number(None)),
    }
}

fn as_naive_date(v: &Value) -> QueryResult<Option<NaiveDate>> {
    match v {
        Value::Date(d) => Ok(*d),
        Value::DateTime(dt) => Ok(dt.map(|dt| dt.date())),
        other => Err(QueryError::InvalidQuery(format!(
            "expected a date-bearing value, got {}",
            other.value_type()
        ))),
    }
}

fn as_naive_time(v: &Value) -> QueryResult<Option<NaiveTime>> {
    match v {
        Value::TimeOfDay(t) => Ok(*t),
        Value::DateTime(dt) => Ok(dt.map(|dt| dt.time())),
        other => Err(QueryError::InvalidQuery(format!(
            "expected a time-bearing value, got {}",
            other.value_type()
        ))),
    }
}

fn date_part(v: &Value, f: impl Fn(NaiveDate) -> f64) -> QueryResult<Value> {
    match as_naive_date(v)? {
        Some(d) => Ok(Value::Number(Some(f(d)))),
        None => Ok(Value::Number(None)),
    }
}

fn time_part(v: &Value, f: impl Fn(NaiveTime) -> f64) -> QueryResult<Value> {
    match as_naive_time(v)? {
        Some(t) => Ok(Value::Number(Some(f(t)))),
        None => Ok(Value::Number(None)),
    }
}

fn date_diff(a: &Value, b: &Value) -> QueryResult<Value> {
    let a = as_naive_date(a)?;
    let b = as_naive_date(b)?;
    match (a, b) {
        (Some(a), Some(b)) => {
            let days = (a - b).num_days();
            Ok(Value::Number(Some(days as f64)))
        }
        _ => Ok(Value::Number(None)),
    }
}

fn text_case(v: &Value, f: impl Fn(&str) -> String) -> QueryResult<Value> {
    match v {
        Value::Text(Some(s)) => Ok(Value::Text(Some(f(s)))),
        Value::Text(None) => Ok(Value::Text(None)),
        other => Err(QueryError::InvalidQuery(format!(
            "expected text, got {}",
            other.value_type()
        ))),
    }
}

fn to_date(v: &Value) -> QueryResult<Value> {
    match v {
        Value::DateTime(dt) => Ok(Value::Date(dt.map(|dt| dt.date()))),
        Value::Number(n) => Ok(Value::Date(n.map(|millis| {
            let secs = (millis / 1000.0) as i64;
            DateTime::from_timestamp(secs, 0)
                .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
                .naive_utc()
                .date()
        }))),
        other => Err(QueryError::InvalidQuery(format!(
            "expected datetime or epoch-millis number, got {}",
            other.value_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn sum_adds_numbers() {
        let f = ScalarFunction::Sum;
        let result = f
            .evaluate(&[Value::Number(Some(2.0)), Value::Number(Some(3.0))])
            .unwrap();
        assert_eq!(result, Value::Number(Some(5.0)));
    }

    #[test]
    fn sum_with_null_operand_is_null() {
        let f = ScalarFunction::Sum;
        let result = f
            .evaluate(&[Value::Number(None), Value::Number(Some(3.0))])
            .unwrap();
        assert_eq!(result, Value::Number(None));
    }

    #[test]
    fn year_extracts_component() {
        let d = NaiveDate::from_ymd_opt(1994, 6, 1).unwrap();
        let result = ScalarFunction::Year.evaluate(&[Value::Date(Some(d))]).unwrap();
        assert_eq!(result, Value::Number(Some(1994.0)));
    }

    #[test]
    fn upper_rejects_non_text() {
        let err = ScalarFunction::Upper
            .evaluate(&[Value::Number(Some(1.0))])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
