//! Table model (component B): column descriptions, rows, cells, the table
//! itself and the table-level column lookup.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{QueryError, QueryResult};
use crate::value::{Value, ValueType};
use crate::warnings::{ReasonType, Warning};

/// Custom key/value properties attached to a column, cell or table.
pub type CustomProperties = HashMap<String, String>;

/// Describes one column of a [`DataTable`]. `id` is unique within the
/// owning table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub id: String,
    pub value_type: ValueType,
    pub label: String,
    pub pattern: Option<String>,
    pub custom_properties: CustomProperties,
}

impl ColumnDescription {
    pub fn new(id: impl Into<String>, value_type: ValueType, label: impl Into<String>) -> Self {
        let id = id.into();
        let label = label.into();
        let label = if label.is_empty() { id.clone() } else { label };
        ColumnDescription {
            id,
            value_type,
            label,
            pattern: None,
            custom_properties: CustomProperties::new(),
        }
    }
}

/// One cell of a [`TableRow`]. `value`'s type must match the owning
/// column's `value_type`; `formatted` may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub value: Value,
    pub formatted: Option<String>,
    pub properties: CustomProperties,
}

impl TableCell {
    pub fn new(value: Value) -> Self {
        TableCell {
            value,
            formatted: None,
            properties: CustomProperties::new(),
        }
    }

    pub fn with_formatted(value: Value, formatted: impl Into<String>) -> Self {
        TableCell {
            value,
            formatted: Some(formatted.into()),
            properties: CustomProperties::new(),
        }
    }
}

/// An ordered list of cells, one per column of the owning table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    cells: Vec<TableCell>,
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        TableRow { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&TableCell> {
        self.cells.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).map(|c| &c.value)
    }

    pub fn cells(&self) -> &[TableCell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut Vec<TableCell> {
        &mut self.cells
    }
}

/// A tabular dataset: ordered unique-id columns, ordered rows, an
/// append-only warning list and custom properties.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Vec<ColumnDescription>,
    column_index: HashMap<String, usize>,
    rows: Vec<TableRow>,
    warnings: Vec<Warning>,
    pub custom_properties: CustomProperties,
}

impl DataTable {
    pub fn new() -> Self {
        DataTable::default()
    }

    pub fn add_column(&mut self, column: ColumnDescription) -> QueryResult<()> {
        if self.column_index.contains_key(&column.id) {
            return Err(QueryError::DuplicateColumn(column.id));
        }
        self.column_index.insert(column.id.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn add_row(&mut self, row: TableRow) -> QueryResult<()> {
        if row.len() != self.columns.len() {
            return Err(QueryError::InvalidQuery(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (cell, column) in row.cells().iter().zip(self.columns.iter()) {
            if cell.value.value_type() != column.value_type {
                return Err(QueryError::TypeMismatch {
                    column: column.id.clone(),
                    expected: column.value_type.to_string(),
                    actual: cell.value.value_type().to_string(),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// Inserts a row constructed internally by this engine. By construction
    /// (§7) such rows are always type-correct; a mismatch here indicates a
    /// bug in this crate, not bad caller input, so it is logged and
    /// swallowed rather than propagated (the engine is the sole row
    /// producer in these call sites).
    pub(crate) fn add_row_infallible(&mut self, row: TableRow) {
        if let Err(err) = self.add_row(row) {
            warn!(error = %err, "internally generated row failed its own type check; dropping row");
        }
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    /// Mutable column metadata access, used by the label/format execution
    /// phases (§4.11) to rewrite a column's label or a cell's formatted
    /// string after projection. Ids and value types are never changed
    /// through this handle.
    pub fn columns_mut(&mut self) -> &mut [ColumnDescription] {
        &mut self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [TableRow] {
        &mut self.rows
    }

    pub fn set_rows(&mut self, rows: Vec<TableRow>) {
        self.rows = rows;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.column_index.get(id).copied()
    }

    pub fn column_description(&self, id: &str) -> Option<&ColumnDescription> {
        self.column_index(id).map(|i| &self.columns[i])
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warn(&mut self, reason: ReasonType, message: impl Into<String>) {
        self.add_warning(Warning::new(reason, message));
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Deep clone, as required by the lifecycle rule "tables clone before a
    /// query may mutate them" (§3). `Clone` already performs a deep copy
    /// since every field owns its data; this is a named alias so call sites
    /// read the way the spec does.
    pub fn deep_clone(&self) -> DataTable {
        self.clone()
    }
}
