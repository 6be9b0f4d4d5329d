//! Query object (component E): the query tree plus the validator that
//! enforces every invariant from §3 / §4.5 before execution.

use std::collections::HashSet;

use crate::column::{AbstractColumn, SimpleColumn};
use crate::error::{QueryError, QueryResult};
use crate::filter::QueryFilter;
use crate::table::DataTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub column: AbstractColumn,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QuerySelection {
    pub columns: Vec<AbstractColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QuerySort {
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryGroup {
    pub columns: Vec<SimpleColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryPivot {
    pub columns: Vec<SimpleColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryLabels {
    pub labels: Vec<(AbstractColumn, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryFormat {
    pub formats: Vec<(AbstractColumn, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QueryOptions {
    pub no_values: bool,
    pub no_format: bool,
}

/// The full query tree (§3). `row_limit == -1` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    pub selection: Option<QuerySelection>,
    pub filter: Option<QueryFilter>,
    pub group: Option<QueryGroup>,
    pub pivot: Option<QueryPivot>,
    pub sort: Option<QuerySort>,
    pub labels: Option<QueryLabels>,
    pub format: Option<QueryFormat>,
    pub options: Option<QueryOptions>,
    pub row_skipping: i64,
    pub row_limit: i64,
    pub row_offset: i64,
}

impl Query {
    pub fn new() -> Self {
        Query {
            row_limit: -1,
            ..Default::default()
        }
    }

    /// True when this query has no clauses at all (§8 property 4,
    /// "Q_identity").
    pub fn is_identity(&self) -> bool {
        self.selection.is_none()
            && self.filter.is_none()
            && self.group.is_none()
            && self.pivot.is_none()
            && self.sort.is_none()
            && self.labels.is_none()
            && self.format.is_none()
            && self.options.is_none()
            && self.row_skipping == 0
            && self.row_limit == -1
            && self.row_offset == 0
    }

    pub fn has_aggregation(&self) -> bool {
        self.selection
            .as_ref()
            .map(|s| s.columns.iter().any(|c| c.contains_aggregation()))
            .unwrap_or(false)
    }

    /// Runs every invariant from §3/§4.5 once, reporting the first offence.
    pub fn validate(&self, table: &DataTable) -> QueryResult<()> {
        if self.row_skipping < 0 {
            return invalid("row_skipping must be >= 0");
        }
        if self.row_limit < -1 {
            return invalid("row_limit must be >= -1");
        }
        if self.row_offset < 0 {
            return invalid("row_offset must be >= 0");
        }

        if let Some(sel) = &self.selection {
            if let Some(dup) = find_duplicate(&sel.columns) {
                return invalid(format!(
                    "duplicate column in selection: {}",
                    dup.canonical_id()
                ));
            }
        }
        if let Some(sort) = &self.sort {
            let cols: Vec<AbstractColumn> = sort.keys.iter().map(|k| k.column.clone()).collect();
            if let Some(dup) = find_duplicate(&cols) {
                return invalid(format!("duplicate column in sort: {}", dup.canonical_id()));
            }
        }
        if let Some(group) = &self.group {
            if let Some(dup) = find_duplicate_simple(&group.columns) {
                return invalid(format!("duplicate column in group: {}", dup));
            }
        }
        if let Some(pivot) = &self.pivot {
            if let Some(dup) = find_duplicate_simple(&pivot.columns) {
                return invalid(format!("duplicate column in pivot: {}", dup));
            }
        }
        if let (Some(group), Some(pivot)) = (&self.group, &self.pivot) {
            for g in &group.columns {
                if pivot.columns.iter().any(|p| p.id == g.id) {
                    return invalid(format!(
                        "column {} appears in both GROUP BY and PIVOT",
                        g.id
                    ));
                }
            }
        }

        if let Some(filter) = &self.filter {
            if !filter.collect_aggregation_columns().is_empty() {
                return invalid("aggregation columns are not allowed inside a filter");
            }
            for id in filter.collect_all_column_ids() {
                if table.column_description(&id).is_none() {
                    return Err(QueryError::ColumnNotFound(id));
                }
            }
        }

        for simple in self
            .group
            .iter()
            .flat_map(|g| g.columns.iter())
            .chain(self.pivot.iter().flat_map(|p| p.columns.iter()))
        {
            if table.column_description(&simple.id).is_none() {
                return Err(QueryError::ColumnNotFound(simple.id.clone()));
            }
        }

        if self.has_aggregation() {
            let groupable_ids: HashSet<String> = self
                .group
                .iter()
                .flat_map(|g| g.columns.iter().map(|c| c.id.clone()))
                .collect();
            if let Some(sel) = &self.selection {
                for col in &sel.columns {
                    if !col.contains_aggregation() && !is_groupable(col, &groupable_ids) {
                        return invalid(format!(
                            "selected column {} is neither aggregated nor groupable",
                            col.canonical_id()
                        ));
                    }
                }
            }
        }

        for col in self.all_value_typed_columns() {
            col.value_type(table)?;
        }

        if let Some(sort) = &self.sort {
            for key in &sort.keys {
                if let AbstractColumn::Aggregation(_) = &key.column {
                    if self.pivot.is_some() {
                        return invalid("pivoting disallows aggregation sort keys");
                    }
                    let in_selection = self
                        .selection
                        .as_ref()
                        .map(|s| s.columns.contains(&key.column))
                        .unwrap_or(false);
                    if !in_selection {
                        return invalid(format!(
                            "sort key {} must appear in the selection",
                            key.column.canonical_id()
                        ));
                    }
                }
            }
        }

        if let Some(sel) = &self.selection {
            if let Some(labels) = &self.labels {
                for (col, _) in &labels.labels {
                    if !sel.columns.contains(col) {
                        return invalid(format!(
                            "label target {} must appear in the selection",
                            col.canonical_id()
                        ));
                    }
                }
            }
            if let Some(format) = &self.format {
                for (col, _) in &format.formats {
                    if !sel.columns.contains(col) {
                        return invalid(format!(
                            "format target {} must appear in the selection",
                            col.canonical_id()
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn all_value_typed_columns(&self) -> Vec<AbstractColumn> {
        let mut out = Vec::new();
        if let Some(sel) = &self.selection {
            out.extend(sel.columns.iter().cloned());
        }
        if let Some(sort) = &self.sort {
            out.extend(sort.keys.iter().map(|k| k.column.clone()));
        }
        if let Some(labels) = &self.labels {
            out.extend(labels.labels.iter().map(|(c, _)| c.clone()));
        }
        if let Some(format) = &self.format {
            out.extend(format.formats.iter().map(|(c, _)| c.clone()));
        }
        out
    }

    pub fn to_query_string(&self) -> QueryResult<String> {
        let mut clauses = Vec::new();
        if let Some(sel) = &self.selection {
            let rendered = sel
                .columns
                .iter()
                .map(|c| c.to_query_string())
                .collect::<QueryResult<Vec<_>>>()?;
            clauses.push(format!("SELECT {}", rendered.join(", ")));
        }
        if let Some(filter) = &self.filter {
            clauses.push(format!("WHERE {}", filter.to_query_string()?));
        }
        if let Some(group) = &self.group {
            let ids = group
                .columns
                .iter()
                .map(|c| crate::column::quote_identifier(&c.id))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("GROUP BY {ids}"));
        }
        if let Some(pivot) = &self.pivot {
            let ids = pivot
                .columns
                .iter()
                .map(|c| crate::column::quote_identifier(&c.id))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("PIVOT {ids}"));
        }
        if let Some(sort) = &self.sort {
            let rendered = sort
                .keys
                .iter()
                .map(|k| {
                    let dir = match k.direction {
                        SortDirection::Ascending => "ASC",
                        SortDirection::Descending => "DESC",
                    };
                    k.column.to_query_string().map(|s| format!("{s} {dir}"))
                })
                .collect::<QueryResult<Vec<_>>>()?;
            clauses.push(format!("ORDER BY {}", rendered.join(", ")));
        }
        if self.row_skipping > 1 {
            clauses.push(format!("SKIPPING {}", self.row_skipping));
        }
        if self.row_limit >= 0 {
            clauses.push(format!("LIMIT {}", self.row_limit));
        }
        if self.row_offset > 0 {
            clauses.push(format!("OFFSET {}", self.row_offset));
        }
        if let Some(labels) = &self.labels {
            let rendered = labels
                .labels
                .iter()
                .map(|(c, label)| {
                    c.to_query_string()
                        .map(|s| format!("{s} '{}'", label.replace('\'', "\\'")))
                })
                .collect::<QueryResult<Vec<_>>>()?;
            clauses.push(format!("LABEL {}", rendered.join(", ")));
        }
        if let Some(format) = &self.format {
            let rendered = format
                .formats
                .iter()
                .map(|(c, pattern)| {
                    c.to_query_string()
                        .map(|s| format!("{s} '{}'", pattern.replace('\'', "\\'")))
                })
                .collect::<QueryResult<Vec<_>>>()?;
            clauses.push(format!("FORMAT {}", rendered.join(", ")));
        }
        if let Some(options) = &self.options {
            let mut opts = Vec::new();
            if options.no_values {
                opts.push("NO_VALUES");
            }
            if options.no_format {
                opts.push("NO_FORMAT");
            }
            if !opts.is_empty() {
                clauses.push(format!("OPTIONS {}", opts.join(" ")));
            }
        }
        Ok(clauses.join(" "))
    }
}

fn invalid<T>(message: impl Into<String>) -> QueryResult<T> {
    Err(QueryError::InvalidQuery(message.into()))
}

fn find_duplicate(columns: &[AbstractColumn]) -> Option<AbstractColumn> {
    for (i, a) in columns.iter().enumerate() {
        for b in &columns[i + 1..] {
            if a == b {
                return Some(a.clone());
            }
        }
    }
    None
}

fn find_duplicate_simple(columns: &[SimpleColumn]) -> Option<String> {
    let mut seen = HashSet::new();
    for c in columns {
        if !seen.insert(&c.id) {
            return Some(c.id.clone());
        }
    }
    None
}

fn is_groupable(col: &AbstractColumn, groupable_ids: &HashSet<String>) -> bool {
    match col {
        AbstractColumn::Simple(s) => groupable_ids.contains(&s.id),
        AbstractColumn::Aggregation(_) => false,
        AbstractColumn::ScalarFunction(f) => {
            f.args.iter().all(|a| is_groupable(a, groupable_ids))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::AggregationKind;
    use crate::table::ColumnDescription;
    use crate::value::ValueType;

    fn sample_table() -> DataTable {
        let mut t = DataTable::new();
        t.add_column(ColumnDescription::new("year", ValueType::Text, "Year"))
            .unwrap();
        t.add_column(ColumnDescription::new("songs", ValueType::Number, "Songs"))
            .unwrap();
        t
    }

    #[test]
    fn identity_query_has_no_clauses() {
        assert!(Query::new().is_identity());
    }

    #[test]
    fn rejects_non_groupable_selection_alongside_aggregation() {
        let table = sample_table();
        let mut q = Query::new();
        q.selection = Some(QuerySelection {
            columns: vec![
                AbstractColumn::aggregation("songs", AggregationKind::Sum),
                AbstractColumn::simple("songs"),
            ],
        });
        let err = q.validate(&table).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }

    #[test]
    fn accepts_groupable_selection_alongside_aggregation() {
        let table = sample_table();
        let mut q = Query::new();
        q.group = Some(QueryGroup {
            columns: vec![SimpleColumn::new("year")],
        });
        q.selection = Some(QuerySelection {
            columns: vec![
                AbstractColumn::simple("year"),
                AbstractColumn::aggregation("songs", AggregationKind::Sum),
            ],
        });
        assert!(q.validate(&table).is_ok());
    }

    #[test]
    fn rejects_shared_group_and_pivot_column() {
        let table = sample_table();
        let mut q = Query::new();
        q.group = Some(QueryGroup {
            columns: vec![SimpleColumn::new("year")],
        });
        q.pivot = Some(QueryPivot {
            columns: vec![SimpleColumn::new("year")],
        });
        let err = q.validate(&table).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
