//! Aggregation engine (component F): the per-column accumulators and the
//! arena-backed aggregation tree that feeds them while rows are scanned
//! (§4.6). Grouping/pivoting table assembly built on top of this lives in
//! `grouping.rs`.

use std::collections::HashMap;

use crate::column::{AbstractColumn, AggregationColumn, ColumnLookup, SimpleColumn, TableLookup};
use crate::error::{QueryError, QueryResult};
use crate::table::{DataTable, TableRow};
use crate::value::{Value, ValueType};

/// Accumulates one aggregated column's statistics across the rows fed to a
/// single tree node (§4.6). Nulls are skipped by every aggregation kind.
#[derive(Debug, Clone)]
pub struct ValueAggregator {
    value_type: ValueType,
    non_null_count: usize,
    /// `None` until the first non-NaN numeric value is seen; stays `None`
    /// forever for non-numeric columns.
    sum: Option<f64>,
    min: Option<Value>,
    max: Option<Value>,
}

impl ValueAggregator {
    pub fn new(value_type: ValueType) -> Self {
        ValueAggregator {
            value_type,
            non_null_count: 0,
            sum: None,
            min: None,
            max: None,
        }
    }

    /// Feeds one row's value for this aggregated column into the running
    /// state. Null values are skipped entirely (§4.6).
    pub fn accumulate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        self.non_null_count += 1;

        if let Value::Number(Some(n)) = value {
            if !n.is_nan() {
                self.sum = Some(self.sum.unwrap_or(0.0) + n);
            }
        }

        self.min = Some(match &self.min {
            None => value.clone(),
            Some(current) => match value.compare(current) {
                Some(std::cmp::Ordering::Less) => value.clone(),
                _ => current.clone(),
            },
        });
        self.max = Some(match &self.max {
            None => value.clone(),
            Some(current) => match value.compare(current) {
                Some(std::cmp::Ordering::Greater) => value.clone(),
                _ => current.clone(),
            },
        });
    }

    /// Produces the result for one `AggregationKind` (§4.6). SUM/AVG on a
    /// non-numeric column is a programmer error — validation (§4.5) and
    /// `AggregationKind::return_type` (column.rs) must already have rejected
    /// such a query before any row reaches this aggregator.
    pub fn finalize(&self, kind: crate::column::AggregationKind) -> Value {
        use crate::column::AggregationKind as K;
        match kind {
            K::Count => Value::Number(Some(self.non_null_count as f64)),
            K::Sum => Value::Number(self.sum),
            K::Avg => {
                if self.non_null_count == 0 {
                    Value::Number(None)
                } else {
                    Value::Number(Some(self.sum.unwrap_or(0.0) / self.non_null_count as f64))
                }
            }
            K::Min => self.min.clone().unwrap_or_else(|| Value::null(self.value_type)),
            K::Max => self.max.clone().unwrap_or_else(|| Value::null(self.value_type)),
        }
    }
}

struct AggNode {
    value: Option<Value>,
    children: HashMap<Value, usize>,
    aggregators: Vec<ValueAggregator>,
}

/// Trie keyed on `group_by ++ pivot_by` values (§4.6, §9). Indices into
/// `nodes` stand in for owning parent/child pointers so the tree can be a
/// flat arena rather than a graph of `Rc`/`RefCell` nodes.
pub struct AggregationTree {
    key_columns: Vec<SimpleColumn>,
    agg_columns: Vec<AggregationColumn>,
    agg_inner_types: Vec<ValueType>,
    nodes: Vec<AggNode>,
}

impl AggregationTree {
    /// `key_columns` is `group_by_ids ++ pivot_by_ids` (§4.6); `agg_columns`
    /// is the deduplicated, first-occurrence-ordered list of aggregations
    /// that will be accumulated at every visited node.
    pub fn new(
        key_columns: Vec<SimpleColumn>,
        agg_columns: Vec<AggregationColumn>,
        table: &DataTable,
    ) -> QueryResult<Self> {
        let mut agg_inner_types = Vec::with_capacity(agg_columns.len());
        for agg in &agg_columns {
            let inner = table
                .column_description(&agg.inner.id)
                .ok_or_else(|| QueryError::ColumnNotFound(agg.inner.id.clone()))?;
            agg_inner_types.push(inner.value_type);
        }
        let root = AggNode {
            value: None,
            children: HashMap::new(),
            aggregators: agg_inner_types.iter().map(|t| ValueAggregator::new(*t)).collect(),
        };
        Ok(AggregationTree {
            key_columns,
            agg_columns,
            agg_inner_types,
            nodes: vec![root],
        })
    }

    pub fn depth(&self) -> usize {
        self.key_columns.len()
    }

    pub fn agg_columns(&self) -> &[AggregationColumn] {
        &self.agg_columns
    }

    fn new_aggregators(&self) -> Vec<ValueAggregator> {
        self.agg_inner_types.iter().map(|t| ValueAggregator::new(*t)).collect()
    }

    fn child_or_insert(&mut self, parent: usize, value: Value) -> usize {
        if let Some(&idx) = self.nodes[parent].children.get(&value) {
            return idx;
        }
        let node = AggNode {
            value: Some(value.clone()),
            children: HashMap::new(),
            aggregators: self.new_aggregators(),
        };
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.insert(value, idx);
        idx
    }

    fn feed(&mut self, node: usize, lookup: &dyn ColumnLookup, row: &TableRow) -> QueryResult<()> {
        for (i, agg) in self.agg_columns.clone().iter().enumerate() {
            let inner = AbstractColumn::Simple(agg.inner.clone());
            let value = inner.evaluate(lookup, row)?;
            self.nodes[node].aggregators[i].accumulate(&value);
        }
        Ok(())
    }

    /// Walks the row from the root down `key_columns`, feeding every
    /// visited node's aggregators (including the root) — §4.6.
    pub fn insert_row(&mut self, table: &DataTable, row: &TableRow) -> QueryResult<()> {
        let lookup = TableLookup::new(table);
        let mut current = 0usize;
        self.feed(current, &lookup, row)?;
        for key_col in self.key_columns.clone() {
            let col = AbstractColumn::Simple(key_col);
            let value = col.evaluate(&lookup, row)?;
            current = self.child_or_insert(current, value);
            self.feed(current, &lookup, row)?;
        }
        Ok(())
    }

    /// DFS over every root-to-leaf path of exactly `depth()` values,
    /// returning the path alongside the leaf's node index (§4.6). Leaves
    /// enumerate in the tree's hash-map iteration order — callers that need
    /// a deterministic order must re-sort with `compare_value_lists`
    /// (§4.6, §9).
    pub fn leaves(&self) -> Vec<(Vec<Value>, usize)> {
        let mut out = Vec::new();
        self.dfs(0, self.depth(), &mut Vec::new(), &mut out);
        out
    }

    fn dfs(&self, node: usize, remaining: usize, path: &mut Vec<Value>, out: &mut Vec<(Vec<Value>, usize)>) {
        if remaining == 0 {
            out.push((path.clone(), node));
            return;
        }
        for &child in self.nodes[node].children.values() {
            path.push(self.nodes[child].value.clone().expect("non-root node always has a value"));
            self.dfs(child, remaining - 1, path, out);
            path.pop();
        }
    }

    pub fn finalize(&self, node: usize, agg_index: usize, kind: crate::column::AggregationKind) -> Value {
        self.nodes[node].aggregators[agg_index].finalize(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::AggregationKind;
    use crate::table::{ColumnDescription, TableCell};

    fn sample_table() -> DataTable {
        let mut t = DataTable::new();
        t.add_column(ColumnDescription::new("band", ValueType::Text, "Band")).unwrap();
        t.add_column(ColumnDescription::new("songs", ValueType::Number, "Songs")).unwrap();
        for (band, songs) in [("Contraband", 2.0), ("Contraband", 2.0), ("Contraband", 4.0), ("Contraband", 4.0)] {
            t.add_row(TableRow::new(vec![
                TableCell::new(Value::Text(Some(band.to_string()))),
                TableCell::new(Value::Number(Some(songs))),
            ]))
            .unwrap();
        }
        t
    }

    #[test]
    fn tree_accumulates_across_all_rows_in_one_group() {
        let table = sample_table();
        let agg = AggregationColumn { inner: SimpleColumn::new("songs"), kind: AggregationKind::Sum };
        let mut tree = AggregationTree::new(vec![SimpleColumn::new("band")], vec![agg], &table).unwrap();
        for row in table.rows() {
            tree.insert_row(&table, row).unwrap();
        }
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 1);
        let (path, idx) = &leaves[0];
        assert_eq!(path, &vec![Value::Text(Some("Contraband".to_string()))]);
        assert_eq!(tree.finalize(*idx, 0, AggregationKind::Sum), Value::Number(Some(12.0)));
    }

    #[test]
    fn count_ignores_nulls() {
        let mut agg = ValueAggregator::new(ValueType::Number);
        agg.accumulate(&Value::Number(None));
        agg.accumulate(&Value::Number(Some(1.0)));
        assert_eq!(agg.finalize(AggregationKind::Count), Value::Number(Some(1.0)));
    }

    #[test]
    fn sum_is_null_when_all_values_null() {
        let mut agg = ValueAggregator::new(ValueType::Number);
        agg.accumulate(&Value::Number(None));
        assert_eq!(agg.finalize(AggregationKind::Sum), Value::Number(None));
    }

    #[test]
    fn min_max_are_typed_null_when_empty() {
        let agg = ValueAggregator::new(ValueType::Text);
        assert_eq!(agg.finalize(AggregationKind::Min), Value::Text(None));
        assert_eq!(agg.finalize(AggregationKind::Max), Value::Text(None));
    }
}
