//! Error taxonomy for query validation, execution and splitting.

use thiserror::Error;

/// Errors surfaced by [`crate::query::Query::validate`], [`crate::engine::QueryEngine`]
/// and [`crate::splitter::split`].
///
/// Non-fatal conditions (truncation, illegal formatting patterns) are not
/// represented here — they are pushed onto the output table's warning sink
/// instead (see [`crate::warnings`]).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("duplicate column id: {0}")]
    DuplicateColumn(String),

    #[error("data source does not support capability: {0}")]
    UnsupportedCapability(String),

    #[error("aggregation column evaluated outside of a resolved lookup: {0}")]
    UnresolvedAggregation(String),

    #[error("string literal mixes single and double quotes: {0}")]
    AmbiguousQuoting(String),

    #[error("compound filter has no children")]
    EmptyCompoundFilter,

    #[error("query exceeds engine limit: {0}")]
    LimitExceeded(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
