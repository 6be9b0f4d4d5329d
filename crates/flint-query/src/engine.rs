//! Query engine (component G): orchestrates the fixed pipeline filter →
//! group+pivot → sort → skip → paginate → select → label → format (§4.10).
//! The splitter (`splitter.rs`) decides which phases run here versus on an
//! external data source; this module always runs every phase its input
//! `Query` still names.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::column::{AbstractColumn, AggregationColumn, ColumnLookup, GenericLookup, ScalarFunctionColumn, SimpleColumn};
use crate::error::{QueryError, QueryResult};
use crate::grouping::{self, GroupingResult};
use crate::locale::{collate_text, DefaultValueFormatterFactory, Locale, ValueFormatterFactory};
use crate::query::{Query, SortDirection};
use crate::table::{ColumnDescription, DataTable, TableCell, TableRow};
use crate::value::Value;
use crate::warnings::ReasonType;

/// Resource ceilings enforced during grouping/pivoting (§10.4). Generous
/// defaults; a host embedding this engine against large or adversarial
/// queries should tighten them. Exceeding either is a `QueryError`, never a
/// panic.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    /// Upper bound on `(distinct group tuples) * (distinct pivot tuples)`
    /// (each aggregation multiplies the derived table's column count, not
    /// this figure, but row×pivot growth is what runs away on adversarial
    /// input).
    pub max_group_pivot_cardinality: usize,
    /// Upper bound on the number of distinct aggregation columns a single
    /// query may select, mirroring the teacher's `MAX_AGGREGATES_PER_QUERY`.
    pub max_aggregation_columns: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        EngineLimits {
            max_group_pivot_cardinality: 1_000_000,
            max_aggregation_columns: 64,
        }
    }
}

/// Executes validated queries against in-memory tables (§6: "one core
/// operation, `execute(query, table, locale) -> table`").
pub struct QueryEngine {
    limits: EngineLimits,
    formatters: Box<dyn ValueFormatterFactory + Send + Sync>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        QueryEngine::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        QueryEngine {
            limits: EngineLimits::default(),
            formatters: Box::new(DefaultValueFormatterFactory),
        }
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        QueryEngine {
            limits,
            formatters: Box::new(DefaultValueFormatterFactory),
        }
    }

    pub fn with_formatter_factory(mut self, formatters: Box<dyn ValueFormatterFactory + Send + Sync>) -> Self {
        self.formatters = formatters;
        self
    }

    /// Runs `query` against `table` (§4, §5). Takes ownership of `table` per
    /// the concurrency model's "execution takes exclusive ownership of the
    /// input"; callers that need the input preserved must clone first.
    #[tracing::instrument(skip(self, table, query, locale))]
    pub fn execute(&self, mut table: DataTable, query: &Query, locale: &Locale) -> QueryResult<DataTable> {
        query.validate(&table)?;

        debug!(phase = "filter");
        self.apply_filter(&mut table, query)?;

        debug!(phase = "group_pivot");
        // §4.8: grouping/pivoting runs only when the selection contains an
        // aggregation, not merely because GROUP BY/PIVOT is present — a
        // group-by with no aggregation is a legal query that must still
        // pass every input row through untouched.
        let (mut table, column_positions) = if query.has_aggregation() {
            let result = self.apply_group_pivot(&table, query)?;
            (result.table, result.column_positions)
        } else {
            (table, HashMap::new())
        };

        debug!(phase = "sort");
        self.apply_sort(&mut table, query, &column_positions, locale)?;

        debug!(phase = "skip");
        apply_skip(&mut table, query);

        debug!(phase = "paginate");
        self.apply_pagination(&mut table, query);

        debug!(phase = "select");
        let (mut table, output_positions) = self.apply_selection(&table, query, &column_positions)?;

        debug!(phase = "label");
        apply_labels(&mut table, query, &output_positions);

        debug!(phase = "format");
        self.apply_format(&mut table, query, locale, &output_positions);

        Ok(table)
    }

    fn apply_filter(&self, table: &mut DataTable, query: &Query) -> QueryResult<()> {
        let Some(filter) = &query.filter else { return Ok(()) };
        let mut kept = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            if filter.is_match(table, row)? {
                kept.push(row.clone());
            }
        }
        table.set_rows(kept);
        Ok(())
    }

    /// Collects the deduplicated, first-occurrence-ordered aggregation
    /// columns and aggregation-bearing scalar-function columns referenced in
    /// the selection, then delegates to `grouping::group_and_pivot` (§4.7).
    fn apply_group_pivot(&self, table: &DataTable, query: &Query) -> QueryResult<GroupingResult> {
        let group_cols = query.group.as_ref().map(|g| g.columns.clone()).unwrap_or_default();
        let pivot_cols = query.pivot.as_ref().map(|p| p.columns.clone()).unwrap_or_default();
        let selection_cols: Vec<AbstractColumn> =
            query.selection.as_ref().map(|s| s.columns.clone()).unwrap_or_default();

        let mut agg_columns: Vec<AggregationColumn> = Vec::new();
        let mut seen: HashSet<AggregationColumn> = HashSet::new();
        for col in &selection_cols {
            let mut found = Vec::new();
            col.collect_aggregation_columns(&mut found);
            for agg in found {
                if seen.insert(agg.clone()) {
                    agg_columns.push(agg);
                }
            }
        }
        if agg_columns.len() > self.limits.max_aggregation_columns {
            return Err(QueryError::LimitExceeded(format!(
                "query selects {} aggregation columns, limit is {}",
                agg_columns.len(),
                self.limits.max_aggregation_columns
            )));
        }

        let sfn_with_agg: Vec<ScalarFunctionColumn> = selection_cols
            .iter()
            .filter_map(|c| match c {
                AbstractColumn::ScalarFunction(f) if c.contains_aggregation() => Some(f.clone()),
                _ => None,
            })
            .collect();

        let result = grouping::group_and_pivot(table, &group_cols, &pivot_cols, &agg_columns, &sfn_with_agg)?;

        let cardinality = result.table.row_count().saturating_mul(result.pivot_tuples.len().max(1));
        if cardinality > self.limits.max_group_pivot_cardinality {
            return Err(QueryError::LimitExceeded(format!(
                "group/pivot produced {cardinality} (group,pivot) cells, limit is {}",
                self.limits.max_group_pivot_cardinality
            )));
        }

        Ok(result)
    }

    /// Stable composite-comparator sort over the ordered sort-key list
    /// (§4.9). Text keys collate through `locale`; every other type uses its
    /// native `Value::compare` order.
    fn apply_sort(
        &self,
        table: &mut DataTable,
        query: &Query,
        column_positions: &HashMap<AbstractColumn, Vec<usize>>,
        locale: &Locale,
    ) -> QueryResult<()> {
        let Some(sort) = &query.sort else { return Ok(()) };
        if sort.keys.is_empty() {
            return Ok(());
        }

        let lookup = build_lookup(table, column_positions);
        let mut rows: Vec<TableRow> = table.rows().to_vec();
        let mut eval_err: Option<QueryError> = None;
        rows.sort_by(|a, b| {
            if eval_err.is_some() {
                return Ordering::Equal;
            }
            for key in &sort.keys {
                let va = match key.column.evaluate(&lookup, a) {
                    Ok(v) => v,
                    Err(e) => {
                        eval_err = Some(e);
                        return Ordering::Equal;
                    }
                };
                let vb = match key.column.evaluate(&lookup, b) {
                    Ok(v) => v,
                    Err(e) => {
                        eval_err = Some(e);
                        return Ordering::Equal;
                    }
                };
                let natural = match (&va, &vb) {
                    (Value::Text(Some(x)), Value::Text(Some(y))) => collate_text(x, y, locale),
                    _ => va.compare(&vb).unwrap_or(Ordering::Equal),
                };
                let ordered = match key.direction {
                    SortDirection::Ascending => natural,
                    SortDirection::Descending => natural.reverse(),
                };
                if ordered != Ordering::Equal {
                    return ordered;
                }
            }
            Ordering::Equal
        });
        if let Some(e) = eval_err {
            return Err(e);
        }
        table.set_rows(rows);
        Ok(())
    }

    /// Pagination window `[offset, offset+limit)` (§4.10); `limit == -1`
    /// disables the upper bound. Emits `DATA_TRUNCATED` when rows beyond the
    /// window were dropped.
    fn apply_pagination(&self, table: &mut DataTable, query: &Query) {
        let total = table.row_count();
        let offset = (query.row_offset.max(0) as usize).min(total);
        let end = if query.row_limit < 0 {
            total
        } else {
            offset.saturating_add(query.row_limit as usize).min(total)
        };
        let dropped = total - end;
        let rows = table.rows()[offset..end].to_vec();
        table.set_rows(rows);
        if dropped > 0 {
            let message = format!("pagination window [{offset}, {end}) dropped {dropped} row(s) of {total}");
            warn!(dropped, total, "pagination truncated rows");
            table.warn(ReasonType::DataTruncated, message);
        }
    }

    /// Projects the selection onto the (possibly grouped/pivoted) table
    /// (§4.8). A selected column already present in `column_positions` emits
    /// one output column per position (a group column present at a single
    /// position emits once); any other column is a fresh scalar-function
    /// expression evaluated per row from a lookup built over the existing
    /// positions.
    fn apply_selection(
        &self,
        table: &DataTable,
        query: &Query,
        column_positions: &HashMap<AbstractColumn, Vec<usize>>,
    ) -> QueryResult<(DataTable, HashMap<AbstractColumn, Vec<usize>>)> {
        let Some(selection) = &query.selection else {
            return Ok((table.deep_clone(), identity_positions(table)));
        };

        enum ColSource {
            Existing(usize),
            Evaluate(AbstractColumn),
        }

        let mut out = DataTable::new();
        let mut out_positions: HashMap<AbstractColumn, Vec<usize>> = HashMap::new();
        let mut sources: Vec<ColSource> = Vec::new();
        let fallback_lookup = build_lookup(table, column_positions);

        for col in &selection.columns {
            // A column this same call's group/pivot phase produced is looked
            // up structurally; a column a splitter-pushed-down data source
            // already materialised (this engine never ran group/pivot for
            // it) is recognised by its canonical id instead — both cases are
            // "already present", never re-evaluated.
            let existing_positions: Option<Vec<usize>> = column_positions
                .get(col)
                .cloned()
                .or_else(|| table.column_index(&col.canonical_id()).map(|pos| vec![pos]));

            if let Some(positions) = existing_positions {
                for pos in positions {
                    let desc = table.columns()[pos].clone();
                    let out_pos = out.columns().len();
                    out.add_column(desc)?;
                    out_positions.entry(col.clone()).or_default().push(out_pos);
                    sources.push(ColSource::Existing(pos));
                }
            } else {
                let value_type = col.value_type(table)?;
                let id = col.canonical_id();
                let desc = ColumnDescription::new(id.clone(), value_type, id);
                let out_pos = out.columns().len();
                out.add_column(desc)?;
                out_positions.entry(col.clone()).or_default().push(out_pos);
                sources.push(ColSource::Evaluate(col.clone()));
            }
        }

        for row in table.rows() {
            let mut cells = Vec::with_capacity(sources.len());
            for source in &sources {
                let value = match source {
                    ColSource::Existing(pos) => row
                        .value(*pos)
                        .cloned()
                        .ok_or_else(|| QueryError::ColumnNotFound(format!("position {pos}")))?,
                    ColSource::Evaluate(col) => col.evaluate(&fallback_lookup, row)?,
                };
                cells.push(TableCell::new(value));
            }
            out.add_row_infallible(TableRow::new(cells));
        }

        Ok((out, out_positions))
    }

    /// Renders each `FORMAT` target's pattern into every cell at its
    /// position(s) (§4.11). An invalid pattern skips the column and attaches
    /// `ILLEGAL_FORMATTING_PATTERNS` instead of failing the query.
    fn apply_format(&self, table: &mut DataTable, query: &Query, locale: &Locale, positions: &HashMap<AbstractColumn, Vec<usize>>) {
        let Some(format) = &query.format else { return };
        if query.options.map(|o| o.no_format).unwrap_or(false) {
            return;
        }

        for (col, pattern) in &format.formats {
            let Some(pos_list) = positions.get(col) else { continue };
            let Some(&first_pos) = pos_list.first() else { continue };
            let Some(value_type) = table.columns().get(first_pos).map(|c| c.value_type) else { continue };

            match self.formatters.formatter(value_type, pattern, locale) {
                Some(formatter) => {
                    for &pos in pos_list {
                        for row in table.rows_mut() {
                            if let Some(cell) = row.cells_mut().get_mut(pos) {
                                cell.formatted = Some(formatter.format(&cell.value));
                            }
                        }
                    }
                }
                None => {
                    let message = format!("pattern {pattern:?} is not valid for column {}", col.canonical_id());
                    warn!(column = %col.canonical_id(), pattern, "illegal formatting pattern");
                    table.warn(ReasonType::IllegalFormattingPatterns, message);
                }
            }
        }
    }
}

/// A `Simple`-only lookup over `table`'s current columns when grouping never
/// ran, or the first-position view of `column_positions` otherwise — enough
/// for both sort-key evaluation and fresh (non-grouped) scalar-function
/// selection columns, since validation already restricts any column used
/// there to exactly one position.
fn build_lookup(table: &DataTable, column_positions: &HashMap<AbstractColumn, Vec<usize>>) -> GenericLookup {
    let mut lookup = GenericLookup::new();
    if column_positions.is_empty() {
        for (i, col) in table.columns().iter().enumerate() {
            lookup.insert(AbstractColumn::Simple(SimpleColumn::new(col.id.clone())), i);
        }
    } else {
        for (col, positions) in column_positions {
            if let Some(&pos) = positions.first() {
                lookup.insert(col.clone(), pos);
            }
        }
    }
    lookup
}

fn identity_positions(table: &DataTable) -> HashMap<AbstractColumn, Vec<usize>> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (AbstractColumn::Simple(SimpleColumn::new(c.id.clone())), vec![i]))
        .collect()
}

/// Retains rows at indices `0, k, 2k, …` (§4.10); `k <= 1` is a no-op.
fn apply_skip(table: &mut DataTable, query: &Query) {
    if query.row_skipping <= 1 {
        return;
    }
    let step = query.row_skipping as usize;
    let kept: Vec<TableRow> = table.rows().iter().step_by(step).cloned().collect();
    table.set_rows(kept);
}

/// Rewrites label targets onto the projected table's column descriptions
/// (§4.11). A column present at one position is relabeled verbatim; a
/// column present at several (post-pivot) keeps its id's pivot-value prefix
/// and appends the new label after it.
fn apply_labels(table: &mut DataTable, query: &Query, positions: &HashMap<AbstractColumn, Vec<usize>>) {
    let Some(labels) = &query.labels else { return };
    for (col, new_label) in &labels.labels {
        let Some(pos_list) = positions.get(col) else { continue };
        if pos_list.len() == 1 {
            if let Some(desc) = table.columns_mut().get_mut(pos_list[0]) {
                desc.label = new_label.clone();
            }
            continue;
        }
        let base_id = col.canonical_id();
        for &pos in pos_list {
            let Some(desc) = table.columns_mut().get_mut(pos) else { continue };
            let prefix = desc.id.strip_suffix(&base_id).map(|p| p.trim_end()).unwrap_or("");
            desc.label = if prefix.is_empty() {
                new_label.clone()
            } else {
                format!("{prefix} {new_label}")
            };
        }
    }
}
