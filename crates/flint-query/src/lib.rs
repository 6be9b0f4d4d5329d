//! # flint-query: in-memory tabular query engine
//!
//! Transforms a [`table::DataTable`] according to a structured, SQL-like
//! [`query::Query`] tree — selection, filter, group-by, pivot, sort,
//! skipping, pagination, labels and formatting — into a new table.
//!
//! Three interlocking pieces:
//! - the query data model and its validator ([`query`], [`column`],
//!   [`filter`]);
//! - the grouping + pivoting + aggregation pipeline ([`aggregation`],
//!   [`grouping`]), driven end to end by [`engine::QueryEngine`];
//! - the [`splitter`], which cuts a query into a pushdown part for an
//!   external, capability-bounded data source and a completion part this
//!   crate executes itself.
//!
//! Query-string *parsing*, wire serialisation, and the underlying table
//! storage layer are out of scope — external collaborators own those; see
//! [`query::Query::to_query_string`] for the one serialisation direction
//! this crate does own.
//!
//! ## Usage
//!
//! ```ignore
//! use flint_query::engine::QueryEngine;
//! use flint_query::locale::Locale;
//!
//! let engine = QueryEngine::new();
//! let result = engine.execute(table, &query, &Locale::root())?;
//! ```

pub mod aggregation;
pub mod column;
pub mod engine;
pub mod error;
pub mod filter;
pub mod functions;
pub mod grouping;
pub mod locale;
pub mod query;
pub mod splitter;
pub mod table;
pub mod value;
pub mod warnings;
