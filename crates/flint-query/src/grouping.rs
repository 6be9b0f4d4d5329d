//! Grouping + pivoting table assembly (§4.7, §4.8): turns an
//! [`AggregationTree`] into the wide derived [`DataTable`] the query engine
//! projects, sorts and paginates next.

use std::collections::{HashMap, HashSet};

use crate::aggregation::AggregationTree;
use crate::column::{AbstractColumn, AggregationColumn, ColumnLookup, GenericLookup, ScalarFunctionColumn, SimpleColumn};
use crate::error::{QueryError, QueryResult};
use crate::table::{ColumnDescription, DataTable, TableCell, TableRow};
use crate::value::{compare_value_lists, Value};

/// The derived table plus a map from every column expression involved in
/// grouping/pivoting to its position(s) in that table (§4.8). A group-by
/// column always maps to one position; an aggregation or aggregation-bearing
/// scalar-function column maps to one position per distinct pivot-value
/// tuple, in pivot-tuple lex order.
pub struct GroupingResult {
    pub table: DataTable,
    pub column_positions: HashMap<AbstractColumn, Vec<usize>>,
    pub pivot_tuples: Vec<Vec<Value>>,
}

/// Builds the aggregation tree over `table`, enumerates its leaves and
/// materialises the output table described in §4.7. `agg_columns` must
/// already be the deduplicated, first-occurrence-ordered set of every
/// aggregation referenced anywhere in the selection (including inside
/// `sfn_with_agg`); `sfn_with_agg` is the selection's scalar-function
/// columns that transitively contain an aggregation.
pub fn group_and_pivot(
    table: &DataTable,
    group_cols: &[SimpleColumn],
    pivot_cols: &[SimpleColumn],
    agg_columns: &[AggregationColumn],
    sfn_with_agg: &[ScalarFunctionColumn],
) -> QueryResult<GroupingResult> {
    let mut key_columns = group_cols.to_vec();
    key_columns.extend(pivot_cols.iter().cloned());
    let mut tree = AggregationTree::new(key_columns, agg_columns.to_vec(), table)?;
    for row in table.rows() {
        tree.insert_row(table, row)?;
    }

    let group_len = group_cols.len();
    let leaves = tree.leaves();

    let mut group_tuple_set: HashSet<Vec<Value>> = HashSet::new();
    let mut pivot_tuple_set: HashSet<Vec<Value>> = HashSet::new();
    let mut cell_values: HashMap<(Vec<Value>, Vec<Value>, usize), Value> = HashMap::new();
    for (path, node_idx) in &leaves {
        let group_tuple = path[..group_len].to_vec();
        let pivot_tuple = path[group_len..].to_vec();
        for (agg_idx, agg) in agg_columns.iter().enumerate() {
            let value = tree.finalize(*node_idx, agg_idx, agg.kind);
            cell_values.insert((group_tuple.clone(), pivot_tuple.clone(), agg_idx), value);
        }
        group_tuple_set.insert(group_tuple);
        pivot_tuple_set.insert(pivot_tuple);
    }

    // Leaves enumerate in hash order (§4.6); re-sort for deterministic
    // presentation (§4.7, §9).
    let mut group_tuples: Vec<Vec<Value>> = group_tuple_set.into_iter().collect();
    group_tuples.sort_by(|a, b| compare_value_lists(a, b));
    let mut pivot_tuples: Vec<Vec<Value>> = pivot_tuple_set.into_iter().collect();
    pivot_tuples.sort_by(|a, b| compare_value_lists(a, b));

    let mut out = DataTable::new();
    let mut column_positions: HashMap<AbstractColumn, Vec<usize>> = HashMap::new();

    // Block 1: one column per group-by id, copied from the input table.
    for g in group_cols {
        let desc = table
            .column_description(&g.id)
            .ok_or_else(|| QueryError::ColumnNotFound(g.id.clone()))?
            .clone();
        let pos = out.columns().len();
        out.add_column(desc)?;
        column_positions
            .entry(AbstractColumn::Simple(g.clone()))
            .or_default()
            .push(pos);
    }

    // Block 2: one column per (pivot-tuple, aggregation), pivot-tuple outer,
    // aggregation inner (§4.7).
    for pivot_tuple in &pivot_tuples {
        for agg in agg_columns {
            let inner_desc = table
                .column_description(&agg.inner.id)
                .ok_or_else(|| QueryError::ColumnNotFound(agg.inner.id.clone()))?;
            let value_type = agg.kind.return_type(inner_desc.value_type)?;
            let base_id = AbstractColumn::Aggregation(agg.clone()).canonical_id();
            let agg_label = format!("{} {}", agg.kind.code().to_uppercase(), inner_desc.label);
            let (id, label) = pivoted_name(pivot_tuple, &base_id, &agg_label);
            let pos = out.columns().len();
            out.add_column(ColumnDescription::new(id, value_type, label))?;
            column_positions
                .entry(AbstractColumn::Aggregation(agg.clone()))
                .or_default()
                .push(pos);
        }
    }

    // Block 3: one column per pivot-tuple for each aggregation-bearing
    // scalar-function column, scalar-function outer, pivot-tuple inner.
    for sfn in sfn_with_agg {
        let col = AbstractColumn::ScalarFunction(sfn.clone());
        let value_type = col.value_type(table)?;
        let base_id = col.canonical_id();
        for pivot_tuple in &pivot_tuples {
            let (id, label) = pivoted_name(pivot_tuple, &base_id, &base_id);
            let pos = out.columns().len();
            out.add_column(ColumnDescription::new(id, value_type, label))?;
            column_positions.entry(col.clone()).or_default().push(pos);
        }
    }

    // One column-lookup per pivot tuple, shared across every output row:
    // group positions first (identical for every tuple), then this tuple's
    // aggregation positions — built before any scalar-function cell is
    // evaluated, so aggregations always resolve first (§4.7).
    let pivot_lookups: Vec<GenericLookup> = (0..pivot_tuples.len())
        .map(|pivot_idx| {
            let mut lookup = GenericLookup::new();
            for g in group_cols {
                if let Some(&pos) = column_positions.get(&AbstractColumn::Simple(g.clone())).and_then(|v| v.first()) {
                    lookup.insert(AbstractColumn::Simple(g.clone()), pos);
                }
            }
            for agg in agg_columns {
                if let Some(&pos) = column_positions
                    .get(&AbstractColumn::Aggregation(agg.clone()))
                    .and_then(|v| v.get(pivot_idx))
                {
                    lookup.insert(AbstractColumn::Aggregation(agg.clone()), pos);
                }
            }
            lookup
        })
        .collect();

    for group_tuple in &group_tuples {
        let mut cells: Vec<TableCell> = group_tuple.iter().cloned().map(TableCell::new).collect();

        for (pivot_idx, pivot_tuple) in pivot_tuples.iter().enumerate() {
            for (agg_idx, agg) in agg_columns.iter().enumerate() {
                let key = (group_tuple.clone(), pivot_tuple.clone(), agg_idx);
                let value = cell_values.get(&key).cloned().unwrap_or_else(|| {
                    let value_type = out.columns()[group_len + pivot_idx * agg_columns.len() + agg_idx].value_type;
                    Value::null(value_type)
                });
                cells.push(TableCell::new(value));
            }
        }

        let row_so_far = TableRow::new(cells.clone());
        for sfn in sfn_with_agg {
            let col = AbstractColumn::ScalarFunction(sfn.clone());
            for lookup in &pivot_lookups {
                let value = col.evaluate(lookup as &dyn ColumnLookup, &row_so_far)?;
                cells.push(TableCell::new(value));
            }
        }

        out.add_row_infallible(TableRow::new(cells));
    }

    Ok(GroupingResult { table: out, column_positions, pivot_tuples })
}

/// `pivotvals <csv values> <base>` for both the column id and, when the
/// tuple is non-empty, the label (§4.3). An empty pivot tuple (no PIVOT
/// clause — the aggregation tree's single implicit pivot level) leaves the
/// base id/label untouched.
fn pivoted_name(pivot_tuple: &[Value], base_id: &str, base_label: &str) -> (String, String) {
    if pivot_tuple.is_empty() {
        return (base_id.to_string(), base_label.to_string());
    }
    let csv = pivot_tuple.iter().map(Value::to_display_string).collect::<Vec<_>>().join(",");
    (
        format!("pivotvals {csv} {base_id}"),
        format!("{csv} {base_label}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::AggregationKind;
    use crate::table::ColumnDescription;
    use crate::value::ValueType;

    fn contraband_table() -> DataTable {
        let mut t = DataTable::new();
        t.add_column(ColumnDescription::new("year", ValueType::Text, "Year")).unwrap();
        t.add_column(ColumnDescription::new("band", ValueType::Text, "Band")).unwrap();
        t.add_column(ColumnDescription::new("songs", ValueType::Number, "Songs")).unwrap();
        t.add_column(ColumnDescription::new("sales", ValueType::Number, "Sales")).unwrap();
        for songs in [2.0, 2.0, 4.0, 4.0, 2.0, 2.0] {
            t.add_row(TableRow::new(vec![
                TableCell::new(Value::Text(Some("1994".to_string()))),
                TableCell::new(Value::Text(Some("Contraband".to_string()))),
                TableCell::new(Value::Number(Some(songs))),
                TableCell::new(Value::Number(Some(4.0))),
            ]))
            .unwrap();
        }
        t
    }

    #[test]
    fn scenario_3_group_by_year_band() {
        let table = contraband_table();
        let group = vec![SimpleColumn::new("year"), SimpleColumn::new("band")];
        let aggs = vec![
            AggregationColumn { inner: SimpleColumn::new("songs"), kind: AggregationKind::Max },
            AggregationColumn { inner: SimpleColumn::new("songs"), kind: AggregationKind::Min },
            AggregationColumn { inner: SimpleColumn::new("songs"), kind: AggregationKind::Avg },
            AggregationColumn { inner: SimpleColumn::new("sales"), kind: AggregationKind::Sum },
        ];
        let result = group_and_pivot(&table, &group, &[], &aggs, &[]).unwrap();
        assert_eq!(result.table.row_count(), 1);
        let row = &result.table.rows()[0];
        assert_eq!(row.value(0), Some(&Value::Text(Some("1994".to_string()))));
        assert_eq!(row.value(1), Some(&Value::Text(Some("Contraband".to_string()))));
        assert_eq!(row.value(2), Some(&Value::Number(Some(4.0))));
        assert_eq!(row.value(3), Some(&Value::Number(Some(2.0))));
        let Some(Value::Number(Some(avg))) = row.value(4) else { panic!("expected number") };
        assert!((avg - 8.0 / 3.0).abs() < 1e-9);
        assert_eq!(row.value(5), Some(&Value::Number(Some(24.0))));
    }

    #[test]
    fn pivot_produces_one_column_per_band_times_aggregation() {
        let table = contraband_table();
        let aggs = vec![AggregationColumn { inner: SimpleColumn::new("sales"), kind: AggregationKind::Max }];
        let result = group_and_pivot(&table, &[SimpleColumn::new("year")], &[SimpleColumn::new("band")], &aggs, &[]).unwrap();
        assert_eq!(result.pivot_tuples.len(), 1);
        assert_eq!(result.table.columns().len(), 2);
        assert!(result.table.columns()[1].id.starts_with("pivotvals Contraband"));
    }

    #[test]
    fn missing_group_pivot_combination_is_typed_null() {
        let mut t = DataTable::new();
        t.add_column(ColumnDescription::new("year", ValueType::Text, "Year")).unwrap();
        t.add_column(ColumnDescription::new("band", ValueType::Text, "Band")).unwrap();
        t.add_column(ColumnDescription::new("sales", ValueType::Number, "Sales")).unwrap();
        t.add_row(TableRow::new(vec![
            TableCell::new(Value::Text(Some("1994".to_string()))),
            TableCell::new(Value::Text(Some("A".to_string()))),
            TableCell::new(Value::Number(Some(1.0))),
        ]))
        .unwrap();
        t.add_row(TableRow::new(vec![
            TableCell::new(Value::Text(Some("1995".to_string()))),
            TableCell::new(Value::Text(Some("B".to_string()))),
            TableCell::new(Value::Number(Some(2.0))),
        ]))
        .unwrap();
        let aggs = vec![AggregationColumn { inner: SimpleColumn::new("sales"), kind: AggregationKind::Sum }];
        let result = group_and_pivot(&t, &[SimpleColumn::new("year")], &[SimpleColumn::new("band")], &aggs, &[]).unwrap();
        assert_eq!(result.pivot_tuples.len(), 2);
        assert_eq!(result.table.row_count(), 2);
        // year=1994 has no band=B entry, so that cell must be a typed null.
        let row0 = &result.table.rows()[0];
        let has_null = row0.cells().iter().any(|c| c.value.is_null());
        assert!(has_null);
    }
}
