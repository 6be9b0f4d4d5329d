//! End-to-end scenarios and universal invariants (spec §8), driven entirely
//! through the public `flint_query` API rather than any inline test helper.

use flint_query::column::AbstractColumn;
use flint_query::engine::QueryEngine;
use flint_query::filter::{ComparisonOp, QueryFilter};
use flint_query::locale::Locale;
use flint_query::query::{Query, QuerySelection, QuerySort, SortDirection, SortKey};
use flint_query::table::{ColumnDescription, DataTable, TableCell, TableRow};
use flint_query::value::{Value, ValueType};
use flint_query::warnings::ReasonType;

fn table(columns: &[(&str, ValueType)], rows: Vec<Vec<Value>>) -> DataTable {
    let mut t = DataTable::new();
    for (id, ty) in columns {
        t.add_column(ColumnDescription::new(*id, *ty, *id)).unwrap();
    }
    for row in rows {
        t.add_row(TableRow::new(row.into_iter().map(TableCell::new).collect()))
            .unwrap();
    }
    t
}

/// Scenario 1: sort ascending by a number column.
#[test]
fn scenario_1_sort_ascending_by_number() {
    let t = table(
        &[("text", ValueType::Text), ("num", ValueType::Number), ("flag", ValueType::Boolean)],
        vec![
            vec![Value::from("aaa"), Value::from(222.0), Value::from(true)],
            vec![Value::from("ccc"), Value::from(111.0), Value::from(true)],
            vec![Value::from("bbb"), Value::from(333.0), Value::from(false)],
        ],
    );
    let mut q = Query::new();
    q.sort = Some(QuerySort {
        keys: vec![SortKey {
            column: AbstractColumn::simple("num"),
            direction: SortDirection::Ascending,
        }],
    });
    let result = QueryEngine::new().execute(t, &q, &Locale::root()).unwrap();
    let nums: Vec<f64> = result
        .rows()
        .iter()
        .map(|r| match r.value(1) {
            Some(Value::Number(Some(n))) => *n,
            _ => panic!("expected a number"),
        })
        .collect();
    assert_eq!(nums, vec![111.0, 222.0, 333.0]);
}

/// Scenario 2: `SELECT name WHERE c1 = c3`.
#[test]
fn scenario_2_column_column_equality_filter() {
    let columns = [("c1", ValueType::Text), ("c2", ValueType::Number), ("c3", ValueType::Text)];

    let matching = table(&columns, vec![vec![Value::from("a"), Value::from(123.0), Value::from("a")]]);
    let mut q = Query::new();
    q.filter = Some(QueryFilter::ColumnColumn {
        left: AbstractColumn::simple("c1"),
        right: AbstractColumn::simple("c3"),
        op: ComparisonOp::Eq,
    });
    q.selection = Some(QuerySelection { columns: vec![AbstractColumn::simple("c1")] });
    let result = QueryEngine::new().execute(matching, &q, &Locale::root()).unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.columns()[0].id, "c1");

    let non_matching = table(&columns, vec![vec![Value::from("a"), Value::from(123.0), Value::from("b")]]);
    let result = QueryEngine::new().execute(non_matching, &q, &Locale::root()).unwrap();
    assert_eq!(result.row_count(), 0);
}

/// Scenario 5: pagination with and without truncation.
#[test]
fn scenario_5_pagination_with_and_without_truncation() {
    let rows: Vec<Vec<Value>> = (0..50).map(|i| vec![Value::from(i as f64)]).collect();
    let base = table(&[("n", ValueType::Number)], rows);

    let mut q = Query::new();
    q.row_limit = 100;
    q.row_offset = 10;
    let result = QueryEngine::new().execute(base.clone(), &q, &Locale::root()).unwrap();
    assert_eq!(result.row_count(), 40);
    assert!(result.warnings().is_empty());

    let mut q2 = Query::new();
    q2.row_limit = 20;
    let result2 = QueryEngine::new().execute(base, &q2, &Locale::root()).unwrap();
    assert_eq!(result2.row_count(), 20);
    assert_eq!(result2.warnings().len(), 1);
    assert_eq!(result2.warnings()[0].reason, ReasonType::DataTruncated);
}

/// Scenario 6: LIKE wildcard semantics, driven through a real filter.
#[test]
fn scenario_6_like_wildcards_through_filter() {
    let cases = [
        ("foo%bar", "foo bar", true),
        ("foo%bar", "foobar", true),
        ("foo%bar", "fooXYZbar", true),
        ("foo_bar", "foo%bar", true),
        ("foo_bar", "foobar", false),
    ];
    for (pattern, text, expected) in cases {
        let t = table(&[("s", ValueType::Text)], vec![vec![Value::from(text)]]);
        let mut q = Query::new();
        q.filter = Some(QueryFilter::ColumnValue {
            column: AbstractColumn::simple("s"),
            value: Value::from(pattern),
            op: ComparisonOp::Like,
            reversed: false,
        });
        let result = QueryEngine::new().execute(t, &q, &Locale::root()).unwrap();
        assert_eq!(result.row_count(), usize::from(expected), "pattern={pattern} text={text}");
    }
}

/// Property 4: executing the identity query changes nothing observable.
#[test]
fn idempotence_of_identity_query() {
    let t = table(
        &[("a", ValueType::Text), ("b", ValueType::Number)],
        vec![
            vec![Value::from("x"), Value::from(1.0)],
            vec![Value::from("y"), Value::from(2.0)],
        ],
    );
    let once = QueryEngine::new().execute(t.clone(), &Query::new(), &Locale::root()).unwrap();
    let twice = QueryEngine::new().execute(once.clone(), &Query::new(), &Locale::root()).unwrap();
    assert_eq!(once.row_count(), twice.row_count());
    assert_eq!(once.columns(), twice.columns());
    assert_eq!(once.rows(), twice.rows());
}

/// Property 2: sort is stable with respect to input order on ties.
#[test]
fn sort_is_stable_on_ties() {
    let t = table(
        &[("key", ValueType::Number), ("order", ValueType::Number)],
        vec![
            vec![Value::from(1.0), Value::from(1.0)],
            vec![Value::from(1.0), Value::from(2.0)],
            vec![Value::from(1.0), Value::from(3.0)],
        ],
    );
    let mut q = Query::new();
    q.sort = Some(QuerySort {
        keys: vec![SortKey {
            column: AbstractColumn::simple("key"),
            direction: SortDirection::Ascending,
        }],
    });
    let result = QueryEngine::new().execute(t, &q, &Locale::root()).unwrap();
    let order: Vec<f64> = result
        .rows()
        .iter()
        .map(|r| match r.value(1) {
            Some(Value::Number(Some(n))) => *n,
            _ => panic!("expected number"),
        })
        .collect();
    assert_eq!(order, vec![1.0, 2.0, 3.0]);
}
