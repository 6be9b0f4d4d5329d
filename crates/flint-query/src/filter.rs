//! Filters (component D): the `QueryFilter` sum type and its `is_match`
//! contract (§4.4).

use regex::Regex;

use crate::column::{AbstractColumn, AggregationColumn, ColumnLookup, ScalarFunctionColumn, TableLookup};
use crate::error::{QueryError, QueryResult};
use crate::table::{DataTable, TableRow};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Like,
}

impl ComparisonOp {
    pub fn token(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gt => ">",
            ComparisonOp::Le => "<=",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Contains => "CONTAINS",
            ComparisonOp::StartsWith => "STARTS WITH",
            ComparisonOp::EndsWith => "ENDS WITH",
            ComparisonOp::Matches => "MATCHES",
            ComparisonOp::Like => "LIKE",
        }
    }

    fn is_ordering_op(&self) -> bool {
        matches!(
            self,
            ComparisonOp::Eq
                | ComparisonOp::Ne
                | ComparisonOp::Lt
                | ComparisonOp::Gt
                | ComparisonOp::Le
                | ComparisonOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundOp {
    And,
    Or,
}

impl CompoundOp {
    pub fn token(&self) -> &'static str {
        match self {
            CompoundOp::And => "AND",
            CompoundOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryFilter {
    ColumnValue {
        column: AbstractColumn,
        value: Value,
        op: ComparisonOp,
        reversed: bool,
    },
    ColumnColumn {
        left: AbstractColumn,
        right: AbstractColumn,
        op: ComparisonOp,
    },
    ColumnIsNull {
        column: AbstractColumn,
    },
    Negation(Box<QueryFilter>),
    Compound {
        op: CompoundOp,
        children: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    pub fn compound(op: CompoundOp, children: Vec<QueryFilter>) -> QueryResult<QueryFilter> {
        if children.is_empty() {
            return Err(QueryError::EmptyCompoundFilter);
        }
        Ok(QueryFilter::Compound { op, children })
    }

    pub fn negate(inner: QueryFilter) -> QueryFilter {
        QueryFilter::Negation(Box::new(inner))
    }

    /// `is_match(table, row)` (§4.4). Builds a `TableLookup` over `table`
    /// internally — filters never reference an aggregation column (enforced
    /// at validation), so a plain table lookup is always sufficient.
    pub fn is_match(&self, table: &DataTable, row: &TableRow) -> QueryResult<bool> {
        let lookup = TableLookup::new(table);
        self.is_match_with_lookup(&lookup, row)
    }

    fn is_match_with_lookup(&self, lookup: &dyn ColumnLookup, row: &TableRow) -> QueryResult<bool> {
        match self {
            QueryFilter::ColumnValue {
                column,
                value,
                op,
                reversed,
            } => {
                let actual = column.evaluate(lookup, row)?;
                let matched = compare_values(*op, &actual, value);
                Ok(matched ^ *reversed)
            }
            QueryFilter::ColumnColumn { left, right, op } => {
                let a = left.evaluate(lookup, row)?;
                let b = right.evaluate(lookup, row)?;
                Ok(compare_values(*op, &a, &b))
            }
            QueryFilter::ColumnIsNull { column } => {
                let v = column.evaluate(lookup, row)?;
                Ok(v.is_null())
            }
            QueryFilter::Negation(inner) => Ok(!inner.is_match_with_lookup(lookup, row)?),
            QueryFilter::Compound { op, children } => {
                if children.is_empty() {
                    return Err(QueryError::EmptyCompoundFilter);
                }
                match op {
                    CompoundOp::And => {
                        for child in children {
                            if !child.is_match_with_lookup(lookup, row)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    CompoundOp::Or => {
                        for child in children {
                            if child.is_match_with_lookup(lookup, row)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                }
            }
        }
    }

    pub fn collect_all_column_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.for_each_column(&mut |c| c.collect_simple_column_ids(&mut out));
        out
    }

    pub fn collect_aggregation_columns(&self) -> Vec<AggregationColumn> {
        let mut out = Vec::new();
        self.for_each_column(&mut |c| c.collect_aggregation_columns(&mut out));
        out
    }

    pub fn collect_scalar_function_columns(&self) -> Vec<ScalarFunctionColumn> {
        let mut out = Vec::new();
        self.for_each_column(&mut |c| c.collect_scalar_function_columns(&mut out));
        out
    }

    fn for_each_column(&self, visit: &mut dyn FnMut(&AbstractColumn)) {
        match self {
            QueryFilter::ColumnValue { column, .. } => visit(column),
            QueryFilter::ColumnColumn { left, right, .. } => {
                visit(left);
                visit(right);
            }
            QueryFilter::ColumnIsNull { column } => visit(column),
            QueryFilter::Negation(inner) => inner.for_each_column(visit),
            QueryFilter::Compound { children, .. } => {
                for child in children {
                    child.for_each_column(visit);
                }
            }
        }
    }

    pub fn to_query_string(&self) -> QueryResult<String> {
        match self {
            QueryFilter::ColumnValue {
                column,
                value,
                op,
                reversed,
            } => {
                let rendered = format!(
                    "{} {} {}",
                    column.to_query_string()?,
                    op.token(),
                    value.to_query_literal()?
                );
                Ok(if *reversed {
                    format!("NOT ({rendered})")
                } else {
                    rendered
                })
            }
            QueryFilter::ColumnColumn { left, right, op } => Ok(format!(
                "{} {} {}",
                left.to_query_string()?,
                op.token(),
                right.to_query_string()?
            )),
            QueryFilter::ColumnIsNull { column } => {
                Ok(format!("{} IS NULL", column.to_query_string()?))
            }
            QueryFilter::Negation(inner) => Ok(format!("NOT ({})", inner.to_query_string()?)),
            QueryFilter::Compound { op, children } => {
                let rendered = children
                    .iter()
                    .map(|c| c.to_query_string())
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(format!("({})", rendered.join(&format!(" {} ", op.token()))))
            }
        }
    }
}

/// Ordering ops are non-match (not an error) on a type mismatch; string ops
/// coerce via `to_display_string`; MATCHES with an invalid pattern is
/// non-match (§4.4).
fn compare_values(op: ComparisonOp, actual: &Value, expected: &Value) -> bool {
    if op.is_ordering_op() {
        return match actual.compare(expected) {
            None => false,
            Some(ord) => match op {
                ComparisonOp::Eq => ord.is_eq(),
                ComparisonOp::Ne => !ord.is_eq(),
                ComparisonOp::Lt => ord.is_lt(),
                ComparisonOp::Gt => ord.is_gt(),
                ComparisonOp::Le => ord.is_le(),
                ComparisonOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            },
        };
    }
    let haystack = actual.to_display_string();
    let needle = expected.to_display_string();
    match op {
        ComparisonOp::Contains => haystack.contains(&needle),
        ComparisonOp::StartsWith => haystack.starts_with(&needle),
        ComparisonOp::EndsWith => haystack.ends_with(&needle),
        ComparisonOp::Matches => regex_whole_match(&needle, &haystack),
        ComparisonOp::Like => like_match(&needle, &haystack),
        _ => unreachable!(),
    }
}

/// Compiles `pattern` and performs a whole-string test (§6); an invalid
/// pattern is treated as a non-match rather than an error.
fn regex_whole_match(pattern: &str, haystack: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re
            .find(haystack)
            .map(|m| m.start() == 0 && m.end() == haystack.len())
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// `%` → any sequence (possibly empty), `_` → exactly one character, every
/// other character literal; whole-string match; no escape sequences (§4.4,
/// scenario 6). Classic greedy wildcard matching, adapted from the
/// teacher's recursive `matches_like_impl` with escape-handling removed.
fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut match_from = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some(pi);
            match_from = ti;
            pi += 1;
        } else if let Some(star_idx) = star {
            pi = star_idx + 1;
            match_from += 1;
            ti = match_from;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
