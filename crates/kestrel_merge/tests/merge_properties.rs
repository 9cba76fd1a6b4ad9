use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::projection::ProjectionLayout;
use kestrel_common::statement::{BoundStatement, OrderByItem, OrderDirection, StatementKind};
use kestrel_merge::{collect_rows, MemoryQueryResult, MergeContext, MergeEngine, QueryResult};
use proptest::prelude::*;

fn arb_shards() -> impl Strategy<Value = Vec<Vec<Option<i64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop_oneof![9 => (-50i64..50).prop_map(Some), 1 => Just(None)], 0..20),
        1..6,
    )
}

fn ordered_statement(direction: OrderDirection) -> BoundStatement {
    let mut stmt = BoundStatement::new(StatementKind::Select);
    stmt.projections.column_count = 2;
    stmt.order_by = vec![OrderByItem::column(0, "k", direction)];
    stmt
}

fn datum(value: Option<i64>) -> Datum {
    value.map_or(Datum::Null, Datum::Int64)
}

/// Each shard sorted the way a database would sort it; column 1 tags the
/// row with (shard, position) so ties can be checked.
fn sorted_streams(shards: &[Vec<Option<i64>>], direction: OrderDirection) -> Vec<Box<dyn QueryResult>> {
    shards
        .iter()
        .enumerate()
        .map(|(shard, values)| {
            let mut values = values.clone();
            // MySQL default: NULL is smallest, first ascending and last descending.
            values.sort();
            if direction == OrderDirection::Desc {
                values.reverse();
            }
            let rows = values
                .into_iter()
                .enumerate()
                .map(|(pos, v)| vec![datum(v), Datum::Int64((shard * 1000 + pos) as i64)])
                .collect();
            Box::new(MemoryQueryResult::new(2, rows_of(rows))) as Box<dyn QueryResult>
        })
        .collect()
}

fn rows_of(rows: Vec<Vec<Datum>>) -> Vec<OwnedRow> {
    rows.into_iter().map(OwnedRow::new).collect()
}

proptest! {
    #[test]
    fn merged_output_is_globally_sorted(shards in arb_shards(), descending in any::<bool>()) {
        let direction = if descending { OrderDirection::Desc } else { OrderDirection::Asc };
        let stmt = ordered_statement(direction);
        let ctx = MergeContext::new(&stmt, ProjectionLayout::build(&stmt, true));
        let mut merged = MergeEngine::new()
            .merge(sorted_streams(&shards, direction), &ctx)
            .unwrap();
        let rows = collect_rows(merged.as_mut()).unwrap();

        let mut expected: Vec<Option<i64>> = shards.iter().flatten().copied().collect();
        expected.sort();
        if descending {
            expected.reverse();
        }
        let keys: Vec<Option<i64>> = rows.iter().map(|r| r.values[0].as_i64()).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn pagination_yields_bounded_window(
        shards in arb_shards(),
        offset in 0u64..40,
        row_count in prop::option::of(0u64..30),
    ) {
        let stmt = ordered_statement(OrderDirection::Asc);
        let ctx = MergeContext::new(&stmt, ProjectionLayout::build(&stmt, true))
            .with_pagination(offset, row_count);
        let available = shards.iter().map(Vec::len).sum::<usize>() as u64;
        let mut merged = MergeEngine::new()
            .merge(sorted_streams(&shards, OrderDirection::Asc), &ctx)
            .unwrap();
        let rows = collect_rows(merged.as_mut()).unwrap();

        let remaining = available.saturating_sub(offset);
        let expected = row_count.map_or(remaining, |n| n.min(remaining));
        if shards.len() > 1 {
            prop_assert_eq!(rows.len() as u64, expected);

            // The window starts at row min(offset, available) of the global order.
            let mut sorted: Vec<Option<i64>> = shards.iter().flatten().copied().collect();
            sorted.sort();
            let start = offset.min(available) as usize;
            let window = &sorted[start..start + expected as usize];
            let keys: Vec<Option<i64>> = rows.iter().map(|r| r.values[0].as_i64()).collect();
            prop_assert_eq!(keys.as_slice(), window);
        }
        prop_assert!(!merged.next().unwrap());
    }
}
