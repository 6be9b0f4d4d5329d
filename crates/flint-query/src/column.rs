//! Column expressions (component C): the `AbstractColumn` sum type and the
//! column-lookup abstraction used to evaluate one against a row.

use std::collections::HashMap;

use crate::error::{QueryError, QueryResult};
use crate::functions::ScalarFunction;
use crate::table::{DataTable, TableRow};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregationKind {
    pub fn code(&self) -> &'static str {
        match self {
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Count => "count",
        }
    }

    /// COUNT is always numeric regardless of the inner column's type (§4.7);
    /// every other aggregation preserves it, except SUM/AVG which require a
    /// numeric inner column in the first place (§3, enforced at validation).
    pub fn return_type(&self, inner: ValueType) -> QueryResult<ValueType> {
        match self {
            AggregationKind::Count => Ok(ValueType::Number),
            AggregationKind::Min | AggregationKind::Max => Ok(inner),
            AggregationKind::Sum | AggregationKind::Avg => {
                if inner == ValueType::Number {
                    Ok(ValueType::Number)
                } else {
                    Err(QueryError::InvalidQuery(format!(
                        "{} requires a numeric column, got {}",
                        self.code(),
                        inner
                    )))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleColumn {
    pub id: String,
}

impl SimpleColumn {
    pub fn new(id: impl Into<String>) -> Self {
        SimpleColumn { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationColumn {
    pub inner: SimpleColumn,
    pub kind: AggregationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarFunctionColumn {
    pub args: Vec<AbstractColumn>,
    pub function: ScalarFunction,
}

/// A column expression: a pre-existing table column, an aggregation over
/// one, or a pure function of other column expressions (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbstractColumn {
    Simple(SimpleColumn),
    Aggregation(AggregationColumn),
    ScalarFunction(ScalarFunctionColumn),
}

impl AbstractColumn {
    pub fn simple(id: impl Into<String>) -> Self {
        AbstractColumn::Simple(SimpleColumn::new(id))
    }

    pub fn aggregation(inner_id: impl Into<String>, kind: AggregationKind) -> Self {
        AbstractColumn::Aggregation(AggregationColumn {
            inner: SimpleColumn::new(inner_id),
            kind,
        })
    }

    pub fn scalar_function(args: Vec<AbstractColumn>, function: ScalarFunction) -> Self {
        AbstractColumn::ScalarFunction(ScalarFunctionColumn { args, function })
    }

    pub fn as_simple(&self) -> Option<&SimpleColumn> {
        match self {
            AbstractColumn::Simple(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_aggregation(&self) -> Option<&AggregationColumn> {
        match self {
            AbstractColumn::Aggregation(a) => Some(a),
            _ => None,
        }
    }

    /// `kind-inner_id` for aggregations, `fn_a,b,c` for scalar functions,
    /// the bare id for simple columns (§4.3).
    pub fn canonical_id(&self) -> String {
        match self {
            AbstractColumn::Simple(s) => s.id.clone(),
            AbstractColumn::Aggregation(a) => format!("{}-{}", a.kind.code(), a.inner.id),
            AbstractColumn::ScalarFunction(f) => {
                let args = f
                    .args
                    .iter()
                    .map(|a| a.canonical_id())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}_{}", f.function.code(), args)
            }
        }
    }

    pub fn value_type(&self, table: &DataTable) -> QueryResult<ValueType> {
        match self {
            AbstractColumn::Simple(s) => table
                .column_description(&s.id)
                .map(|c| c.value_type)
                .ok_or_else(|| QueryError::ColumnNotFound(s.id.clone())),
            AbstractColumn::Aggregation(a) => {
                let inner = table
                    .column_description(&a.inner.id)
                    .map(|c| c.value_type)
                    .ok_or_else(|| QueryError::ColumnNotFound(a.inner.id.clone()))?;
                a.kind.return_type(inner)
            }
            AbstractColumn::ScalarFunction(f) => {
                let arg_types = f
                    .args
                    .iter()
                    .map(|a| a.value_type(table))
                    .collect::<QueryResult<Vec<_>>>()?;
                f.function.return_type(&arg_types)
            }
        }
    }

    /// Evaluates this column against `row` through `lookup` (§4.3): a
    /// precomputed position always wins; otherwise a `SimpleColumn` is an
    /// error, an `AggregationColumn` is a programmer error (it must always
    /// be resolved through a lookup after grouping), and a
    /// `ScalarFunctionColumn` recurses into its arguments.
    pub fn evaluate(&self, lookup: &dyn ColumnLookup, row: &TableRow) -> QueryResult<Value> {
        if let Some(index) = lookup.index_of(self) {
            return row
                .value(index)
                .cloned()
                .ok_or_else(|| QueryError::ColumnNotFound(self.canonical_id()));
        }
        match self {
            AbstractColumn::Simple(s) => Err(QueryError::ColumnNotFound(s.id.clone())),
            AbstractColumn::Aggregation(_) => {
                Err(QueryError::UnresolvedAggregation(self.canonical_id()))
            }
            AbstractColumn::ScalarFunction(f) => {
                let args = f
                    .args
                    .iter()
                    .map(|a| a.evaluate(lookup, row))
                    .collect::<QueryResult<Vec<_>>>()?;
                f.function.evaluate(&args)
            }
        }
    }

    pub fn collect_simple_column_ids(&self, out: &mut Vec<String>) {
        match self {
            AbstractColumn::Simple(s) => out.push(s.id.clone()),
            AbstractColumn::Aggregation(a) => out.push(a.inner.id.clone()),
            AbstractColumn::ScalarFunction(f) => {
                for arg in &f.args {
                    arg.collect_simple_column_ids(out);
                }
            }
        }
    }

    pub fn collect_aggregation_columns(&self, out: &mut Vec<AggregationColumn>) {
        match self {
            AbstractColumn::Simple(_) => {}
            AbstractColumn::Aggregation(a) => out.push(a.clone()),
            AbstractColumn::ScalarFunction(f) => {
                for arg in &f.args {
                    arg.collect_aggregation_columns(out);
                }
            }
        }
    }

    pub fn collect_scalar_function_columns(&self, out: &mut Vec<ScalarFunctionColumn>) {
        if let AbstractColumn::ScalarFunction(f) = self {
            out.push(f.clone());
            for arg in &f.args {
                arg.collect_scalar_function_columns(out);
            }
        }
    }

    pub fn contains_aggregation(&self) -> bool {
        match self {
            AbstractColumn::Simple(_) => false,
            AbstractColumn::Aggregation(_) => true,
            AbstractColumn::ScalarFunction(f) => f.args.iter().any(|a| a.contains_aggregation()),
        }
    }

    /// Renders per §6: infix for the four arithmetic functions, `fn(args)`
    /// call syntax otherwise, `KIND(col)` for aggregations, the bare id for
    /// simple columns.
    pub fn to_query_string(&self) -> QueryResult<String> {
        match self {
            AbstractColumn::Simple(s) => Ok(quote_identifier(&s.id)),
            AbstractColumn::Aggregation(a) => {
                Ok(format!(
                    "{}({})",
                    a.kind.code().to_uppercase(),
                    quote_identifier(&a.inner.id)
                ))
            }
            AbstractColumn::ScalarFunction(f) => {
                if let ScalarFunction::Constant(v) = &f.function {
                    return v.to_query_literal();
                }
                let rendered_args = f
                    .args
                    .iter()
                    .map(|a| a.to_query_string())
                    .collect::<QueryResult<Vec<_>>>()?;
                if let Some(symbol) = f.function.infix_symbol() {
                    if rendered_args.len() == 2 {
                        return Ok(format!(
                            "({} {} {})",
                            rendered_args[0], symbol, rendered_args[1]
                        ));
                    }
                }
                Ok(format!("{}({})", f.function.code(), rendered_args.join(", ")))
            }
        }
    }
}

/// Backtick-quotes an identifier that collides with a reserved word or
/// contains whitespace (§6). Reserved words are the clause keywords.
pub fn quote_identifier(id: &str) -> String {
    const RESERVED: &[&str] = &[
        "select", "where", "group", "by", "pivot", "order", "skipping", "limit", "offset",
        "label", "format", "options", "and", "or", "not",
    ];
    let needs_quoting =
        id.contains(' ') || RESERVED.contains(&id.to_ascii_lowercase().as_str());
    if needs_quoting {
        format!("`{id}`")
    } else {
        id.to_string()
    }
}

/// Maps an [`AbstractColumn`] (by structural identity) to a position in a
/// row (§4.2).
pub trait ColumnLookup {
    fn index_of(&self, column: &AbstractColumn) -> Option<usize>;
}

/// Maps any `SimpleColumn` to the owning table's positional index.
pub struct TableLookup<'a> {
    table: &'a DataTable,
}

impl<'a> TableLookup<'a> {
    pub fn new(table: &'a DataTable) -> Self {
        TableLookup { table }
    }
}

impl ColumnLookup for TableLookup<'_> {
    fn index_of(&self, column: &AbstractColumn) -> Option<usize> {
        match column {
            AbstractColumn::Simple(s) => self.table.column_index(&s.id),
            _ => None,
        }
    }
}

/// Maps arbitrary `AbstractColumn`s to positions, built for derived tables
/// after grouping/pivoting (§4.2, §4.7, §4.8).
#[derive(Debug, Clone, Default)]
pub struct GenericLookup {
    positions: HashMap<AbstractColumn, usize>,
}

impl GenericLookup {
    pub fn new() -> Self {
        GenericLookup::default()
    }

    pub fn insert(&mut self, column: AbstractColumn, index: usize) {
        self.positions.insert(column, index);
    }

    pub fn get(&self, column: &AbstractColumn) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl ColumnLookup for GenericLookup {
    fn index_of(&self, column: &AbstractColumn) -> Option<usize> {
        self.get(column)
    }
}
