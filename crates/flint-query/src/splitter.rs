//! Query splitter (component H, §4.12): cuts a query into a pushdown part
//! for an external, capability-bounded data source and a completion part
//! this engine still has to run. Neither half is executed here — `split`
//! only decides the two `Query` values; the caller dispatches the pushdown
//! half to its data source and feeds the returned table plus the completion
//! half into [`crate::engine::QueryEngine::execute`].

use std::collections::HashSet;

use tracing::trace;

use crate::column::{AbstractColumn, AggregationKind};
use crate::error::QueryResult;
use crate::query::{Query, QueryGroup, QuerySelection};

/// Capability a data source declares support for. `Sql` is the richest tier
/// (full relational pushdown short of scalar functions); `SortAndPagination`
/// and `Select` are narrower; `All`/`None` are the two trivial extremes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capabilities {
    All,
    None,
    Sql,
    SortAndPagination,
    Select,
}

/// Splits `query` per its declared `capabilities` (§4.12). Returns
/// `(dataSourceQuery, completionQuery)`; `dataSourceQuery` is `None` exactly
/// when nothing can be pushed down.
pub fn split(query: &Query, capabilities: Capabilities) -> QueryResult<(Option<Query>, Query)> {
    trace!(?capabilities, "split query");
    match capabilities {
        Capabilities::All => Ok((Some(query.clone()), Query::new())),
        Capabilities::None => Ok((None, query.clone())),
        Capabilities::Select => Ok(split_select(query)),
        Capabilities::SortAndPagination => Ok(split_sort_and_pagination(query)),
        Capabilities::Sql => Ok(split_sql(query)),
    }
}

/// Pushes a raw-column SELECT for every simple column id referenced
/// anywhere in `query`; `query` itself runs unchanged in completion.
fn split_select(query: &Query) -> (Option<Query>, Query) {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for id in collect_all_simple_ids(query) {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    let mut data_source = Query::new();
    data_source.selection = Some(QuerySelection {
        columns: ids.into_iter().map(AbstractColumn::simple).collect(),
    });
    (Some(data_source), query.clone())
}

fn collect_all_simple_ids(query: &Query) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(sel) = &query.selection {
        for c in &sel.columns {
            c.collect_simple_column_ids(&mut out);
        }
    }
    if let Some(filter) = &query.filter {
        out.extend(filter.collect_all_column_ids());
    }
    if let Some(group) = &query.group {
        out.extend(group.columns.iter().map(|c| c.id.clone()));
    }
    if let Some(pivot) = &query.pivot {
        out.extend(pivot.columns.iter().map(|c| c.id.clone()));
    }
    if let Some(sort) = &query.sort {
        for k in &sort.keys {
            k.column.collect_simple_column_ids(&mut out);
        }
    }
    if let Some(labels) = &query.labels {
        for (c, _) in &labels.labels {
            c.collect_simple_column_ids(&mut out);
        }
    }
    if let Some(format) = &query.format {
        for (c, _) in &format.formats {
            c.collect_simple_column_ids(&mut out);
        }
    }
    out
}

/// Sort + pagination pushdown is only safe when nothing upstream of it in
/// the fixed pipeline (filter, group, pivot) or scalar-function evaluation
/// still needs to run locally against the *unsorted* rows — any of those
/// present falls back to `NONE`.
fn split_sort_and_pagination(query: &Query) -> (Option<Query>, Query) {
    if query.filter.is_some() || query.group.is_some() || query.pivot.is_some() || uses_scalar_function(query) {
        trace!("sort+pagination pushdown not applicable, falling back to NONE");
        return (None, query.clone());
    }

    let mut data_source = Query::new();
    let mut completion = query.clone();

    if let Some(sort) = &query.sort {
        data_source.sort = Some(sort.clone());
        completion.sort = None;
    }

    // Skipping happens after sort but before pagination in the fixed order
    // (§4.10); pushing limit/offset past a skip this engine still owns
    // would paginate the wrong row set, so skipping forces both to stay
    // local.
    if query.row_skipping <= 1 {
        data_source.row_limit = query.row_limit;
        data_source.row_offset = query.row_offset;
        completion.row_limit = -1;
        completion.row_offset = 0;
    }

    (Some(data_source), completion)
}

/// Full relational pushdown short of scalar functions and the
/// pivot/label-aggregation conflict (§4.12) — both fall back to `NONE`.
fn split_sql(query: &Query) -> (Option<Query>, Query) {
    if uses_scalar_function(query) || pivots_while_targeting_aggregation(query) {
        trace!("SQL pushdown not applicable, falling back to NONE");
        return (None, query.clone());
    }

    if query.pivot.is_some() {
        return split_sql_pivot(query);
    }

    let mut data_source = Query::new();
    data_source.selection = query.selection.clone();
    data_source.filter = query.filter.clone();
    data_source.group = query.group.clone();
    data_source.row_limit = query.row_limit;
    data_source.row_offset = query.row_offset;

    let mut completion = query.clone();
    completion.filter = None;
    completion.group = None;
    completion.row_limit = -1;
    completion.row_offset = 0;
    // selection stays: labels/format validate against it, and the engine's
    // selection phase recognises a column the data source already emitted
    // by canonical id rather than re-evaluating it.

    (Some(data_source), completion)
}

/// PIVOT unpivoted into a tall table at the source (§4.12): the source
/// groups by `group_by ++ pivot_by` and selects those keys plus every
/// aggregation column verbatim; completion re-groups/re-pivots by the
/// original keys, with each aggregation column replaced by a degenerate
/// `MIN(<aggregation's own canonical id>)` over what the source already
/// computed.
fn split_sql_pivot(query: &Query) -> (Option<Query>, Query) {
    let group_cols = query.group.as_ref().map(|g| g.columns.clone()).unwrap_or_default();
    let pivot_cols = query.pivot.as_ref().map(|p| p.columns.clone()).unwrap_or_default();

    let mut unpivoted_group = group_cols;
    unpivoted_group.extend(pivot_cols);

    let mut source_selection: Vec<AbstractColumn> =
        unpivoted_group.iter().map(|c| AbstractColumn::Simple(c.clone())).collect();
    if let Some(sel) = &query.selection {
        for col in &sel.columns {
            if matches!(col, AbstractColumn::Aggregation(_)) {
                source_selection.push(col.clone());
            }
        }
    }

    let mut data_source = Query::new();
    data_source.filter = query.filter.clone();
    data_source.group = Some(QueryGroup { columns: unpivoted_group });
    data_source.selection = Some(QuerySelection { columns: source_selection });

    let mut completion = query.clone();
    completion.filter = None;
    // limit/offset are not pushed here: the source must return every
    // unpivoted row for completion's re-grouping/re-pivoting to be correct.
    if let Some(sel) = &mut completion.selection {
        for col in &mut sel.columns {
            *col = degenerate_for_pivot(col);
        }
    }
    if let Some(labels) = &mut completion.labels {
        for (col, _) in &mut labels.labels {
            *col = degenerate_for_pivot(col);
        }
    }
    if let Some(format) = &mut completion.format {
        for (col, _) in &mut format.formats {
            *col = degenerate_for_pivot(col);
        }
    }

    (Some(data_source), completion)
}

fn degenerate_for_pivot(col: &AbstractColumn) -> AbstractColumn {
    match col {
        AbstractColumn::Aggregation(a) => {
            let source_id = AbstractColumn::Aggregation(a.clone()).canonical_id();
            AbstractColumn::aggregation(source_id, AggregationKind::Min)
        }
        other => other.clone(),
    }
}

fn uses_scalar_function(query: &Query) -> bool {
    let mut found = Vec::new();
    if let Some(sel) = &query.selection {
        for c in &sel.columns {
            c.collect_scalar_function_columns(&mut found);
        }
    }
    if let Some(sort) = &query.sort {
        for k in &sort.keys {
            k.column.collect_scalar_function_columns(&mut found);
        }
    }
    if let Some(filter) = &query.filter {
        found.extend(filter.collect_scalar_function_columns());
    }
    !found.is_empty()
}

fn pivots_while_targeting_aggregation(query: &Query) -> bool {
    if query.pivot.is_none() {
        return false;
    }
    let is_aggregation = |c: &AbstractColumn| matches!(c, AbstractColumn::Aggregation(_));
    let labels_hit = query.labels.as_ref().map(|l| l.labels.iter().any(|(c, _)| is_aggregation(c))).unwrap_or(false);
    let format_hit = query.format.as_ref().map(|f| f.formats.iter().any(|(c, _)| is_aggregation(c))).unwrap_or(false);
    labels_hit || format_hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::SimpleColumn;
    use crate::query::{QueryFormat, QueryGroup as QGroup, QueryLabels, QueryPivot, QuerySort, SortDirection, SortKey};

    #[test]
    fn all_pushes_everything_completion_is_identity() {
        let mut q = Query::new();
        q.selection = Some(QuerySelection { columns: vec![AbstractColumn::simple("a")] });
        let (source, completion) = split(&q, Capabilities::All).unwrap();
        assert_eq!(source, Some(q));
        assert!(completion.is_identity());
    }

    #[test]
    fn none_pushes_nothing() {
        let mut q = Query::new();
        q.selection = Some(QuerySelection { columns: vec![AbstractColumn::simple("a")] });
        let (source, completion) = split(&q, Capabilities::None).unwrap();
        assert_eq!(source, None);
        assert_eq!(completion, q);
    }

    #[test]
    fn select_pushes_every_referenced_simple_id_once() {
        let mut q = Query::new();
        q.selection = Some(QuerySelection {
            columns: vec![AbstractColumn::simple("a"), AbstractColumn::aggregation("b", AggregationKind::Sum)],
        });
        q.sort = Some(QuerySort {
            keys: vec![SortKey { column: AbstractColumn::simple("a"), direction: SortDirection::Ascending }],
        });
        let (source, completion) = split(&q, Capabilities::Select).unwrap();
        let ids: Vec<_> = source.unwrap().selection.unwrap().columns.into_iter().map(|c| c.canonical_id()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(completion, q);
    }

    #[test]
    fn sort_and_pagination_falls_back_on_filter() {
        use crate::filter::QueryFilter;
        let mut q = Query::new();
        q.filter = Some(QueryFilter::ColumnIsNull { column: AbstractColumn::simple("a") });
        q.sort = Some(QuerySort {
            keys: vec![SortKey { column: AbstractColumn::simple("a"), direction: SortDirection::Ascending }],
        });
        let (source, completion) = split(&q, Capabilities::SortAndPagination).unwrap();
        assert_eq!(source, None);
        assert_eq!(completion, q);
    }

    #[test]
    fn sort_and_pagination_pushes_sort_and_limit() {
        let mut q = Query::new();
        q.sort = Some(QuerySort {
            keys: vec![SortKey { column: AbstractColumn::simple("a"), direction: SortDirection::Descending }],
        });
        q.row_limit = 10;
        q.row_offset = 5;
        let (source, completion) = split(&q, Capabilities::SortAndPagination).unwrap();
        let source = source.unwrap();
        assert_eq!(source.sort, q.sort);
        assert_eq!(source.row_limit, 10);
        assert_eq!(source.row_offset, 5);
        assert!(completion.sort.is_none());
        assert_eq!(completion.row_limit, -1);
        assert_eq!(completion.row_offset, 0);
    }

    #[test]
    fn sort_and_pagination_keeps_limit_local_when_skipping() {
        let mut q = Query::new();
        q.row_skipping = 2;
        q.row_limit = 10;
        let (source, completion) = split(&q, Capabilities::SortAndPagination).unwrap();
        let source = source.unwrap();
        assert_eq!(source.row_limit, -1);
        assert_eq!(completion.row_limit, 10);
        assert_eq!(completion.row_skipping, 2);
    }

    #[test]
    fn sql_pushes_filter_group_and_clears_them_from_completion() {
        use crate::filter::QueryFilter;
        let mut q = Query::new();
        q.filter = Some(QueryFilter::ColumnIsNull { column: AbstractColumn::simple("year") });
        q.group = Some(QGroup { columns: vec![SimpleColumn::new("year")] });
        q.selection = Some(QuerySelection {
            columns: vec![AbstractColumn::simple("year"), AbstractColumn::aggregation("sales", AggregationKind::Sum)],
        });
        let (source, completion) = split(&q, Capabilities::Sql).unwrap();
        let source = source.unwrap();
        assert_eq!(source.filter, q.filter);
        assert_eq!(source.group, q.group);
        assert_eq!(source.selection, q.selection);
        assert!(completion.filter.is_none());
        assert!(completion.group.is_none());
        assert_eq!(completion.selection, q.selection);
    }

    #[test]
    fn sql_falls_back_to_none_when_query_uses_scalar_function() {
        use crate::functions::ScalarFunction;
        let mut q = Query::new();
        q.selection = Some(QuerySelection {
            columns: vec![AbstractColumn::scalar_function(
                vec![AbstractColumn::simple("a"), AbstractColumn::simple("b")],
                ScalarFunction::Sum,
            )],
        });
        let (source, _) = split(&q, Capabilities::Sql).unwrap();
        assert_eq!(source, None);
    }

    #[test]
    fn sql_pivot_unpivots_to_tall_group_and_degenerates_aggregation() {
        let mut q = Query::new();
        q.group = Some(QGroup { columns: vec![SimpleColumn::new("year")] });
        q.pivot = Some(QueryPivot { columns: vec![SimpleColumn::new("band")] });
        q.selection = Some(QuerySelection {
            columns: vec![AbstractColumn::simple("year"), AbstractColumn::aggregation("sales", AggregationKind::Sum)],
        });
        q.labels = Some(QueryLabels {
            labels: vec![(AbstractColumn::aggregation("sales", AggregationKind::Sum), "Revenue".to_string())],
        });
        let (source, completion) = split(&q, Capabilities::Sql).unwrap();
        let source = source.unwrap();
        assert_eq!(source.group.unwrap().columns, vec![SimpleColumn::new("year"), SimpleColumn::new("band")]);
        assert!(source.selection.unwrap().columns.contains(&AbstractColumn::aggregation("sales", AggregationKind::Sum)));

        // group/pivot are unchanged in completion — only the aggregation
        // column degenerates to MIN over the source's own output id.
        assert_eq!(completion.group, q.group);
        assert_eq!(completion.pivot, q.pivot);
        let degenerate = AbstractColumn::aggregation("sum-sales", AggregationKind::Min);
        assert!(completion.selection.unwrap().columns.contains(&degenerate));
        assert_eq!(completion.labels.unwrap().labels[0].0, degenerate);
    }

    #[test]
    fn sql_falls_back_when_pivot_labels_an_aggregation() {
        let mut q = Query::new();
        q.group = Some(QGroup { columns: vec![SimpleColumn::new("year")] });
        q.pivot = Some(QueryPivot { columns: vec![SimpleColumn::new("band")] });
        q.selection = Some(QuerySelection {
            columns: vec![AbstractColumn::simple("year"), AbstractColumn::aggregation("sales", AggregationKind::Sum)],
        });
        q.format = Some(QueryFormat {
            formats: vec![(AbstractColumn::aggregation("sales", AggregationKind::Sum), "0.00".to_string())],
        });
        let (source, _) = split(&q, Capabilities::Sql).unwrap();
        assert_eq!(source, None);
    }
}
