//! Column layout of a select statement once it runs on several shards.
//!
//! Multi-shard execution appends derived columns after the visible ones:
//! `COUNT`/`SUM` pairs for every `AVG`, plus GROUP BY / ORDER BY expressions
//! missing from the select list. The rewriter renders them and the merger
//! reads them back by index, so both sides take the layout from here.
//!
//! A statement with an aggregate that cannot be split into partials runs in
//! raw-row mode instead: shards select each aggregate's argument in place of
//! the call, drop their GROUP BY and ORDER BY, and the merger computes every
//! aggregate from the raw rows.

use crate::statement::{
    AggregationKind, BoundStatement, NullsOrder, OrderByItem, OrderDirection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    AvgCount,
    AvgSum,
    GroupBy,
    OrderBy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub kind: DerivedKind,
    pub expression: String,
    pub alias: String,
    pub index: usize,
}

impl DerivedColumn {
    /// `expression AS alias`, as appended to the select list.
    pub fn to_sql(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

/// A sort key resolved to a column index with an explicit NULL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: NullsOrder,
}

/// Where AVG(x) and its derived COUNT(x)/SUM(x) live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvgColumns {
    pub avg_index: usize,
    pub count_index: usize,
    pub sum_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionLayout {
    pub visible_columns: usize,
    pub derived: Vec<DerivedColumn>,
    pub avg_columns: Vec<AvgColumns>,
    pub order_by: Vec<SortKey>,
    pub group_by: Vec<SortKey>,
    /// The statement groups without ordering: shards are asked to
    /// `ORDER BY` the grouping items so groups arrive contiguous.
    pub order_by_from_group_by: bool,
    /// Shards return raw rows instead of partial aggregates.
    pub raw_rows: bool,
}

impl ProjectionLayout {
    pub fn total_columns(&self) -> usize {
        self.visible_columns + self.derived.len()
    }

    /// True when the ordering keys start with the grouping keys (same columns,
    /// any direction), so groups are contiguous in every shard stream.
    pub fn group_by_streamable(&self) -> bool {
        if self.group_by.is_empty() || self.group_by.len() > self.order_by.len() {
            return false;
        }
        let mut group_cols: Vec<usize> = self.group_by.iter().map(|k| k.index).collect();
        let mut prefix: Vec<usize> = self.order_by[..self.group_by.len()]
            .iter()
            .map(|k| k.index)
            .collect();
        group_cols.sort_unstable();
        prefix.sort_unstable();
        group_cols == prefix
    }

    /// Build the layout. `with_derived` is false for single-shard execution,
    /// where nothing is appended and missing keys stay unresolved.
    pub fn build(stmt: &BoundStatement, with_derived: bool) -> Self {
        let visible = stmt.projections.column_count;
        let mut derived: Vec<DerivedColumn> = Vec::new();
        let mut avg_columns = Vec::new();
        let raw_rows = with_derived
            && stmt
                .projections
                .aggregations
                .iter()
                .any(|a| a.computed_centrally());

        if with_derived && !raw_rows {
            let avgs = stmt
                .projections
                .aggregations
                .iter()
                .filter(|a| a.kind == AggregationKind::Avg);
            for (n, agg) in avgs.enumerate() {
                let count_index = visible + derived.len();
                derived.push(DerivedColumn {
                    kind: DerivedKind::AvgCount,
                    expression: format!("COUNT({})", agg.argument),
                    alias: format!("AVG_DERIVED_COUNT_{n}"),
                    index: count_index,
                });
                let sum_index = visible + derived.len();
                derived.push(DerivedColumn {
                    kind: DerivedKind::AvgSum,
                    expression: format!("SUM({})", agg.argument),
                    alias: format!("AVG_DERIVED_SUM_{n}"),
                    index: sum_index,
                });
                avg_columns.push(AvgColumns {
                    avg_index: agg.index,
                    count_index,
                    sum_index,
                });
            }
        }

        let group_by = resolve_items(
            stmt,
            &stmt.group_by,
            DerivedKind::GroupBy,
            "GROUP_BY_DERIVED",
            with_derived,
            &mut derived,
        );
        let order_by_from_group_by =
            stmt.order_by.is_empty() && !stmt.group_by.is_empty() && !raw_rows;
        let order_by = if stmt.order_by.is_empty() && !stmt.group_by.is_empty() {
            group_by.clone()
        } else {
            resolve_items(
                stmt,
                &stmt.order_by,
                DerivedKind::OrderBy,
                "ORDER_BY_DERIVED",
                with_derived,
                &mut derived,
            )
        };

        Self {
            visible_columns: visible,
            derived,
            avg_columns,
            order_by,
            group_by,
            order_by_from_group_by,
            raw_rows,
        }
    }
}

fn resolve_items(
    stmt: &BoundStatement,
    items: &[OrderByItem],
    kind: DerivedKind,
    alias_prefix: &str,
    with_derived: bool,
    derived: &mut Vec<DerivedColumn>,
) -> Vec<SortKey> {
    let visible = stmt.projections.column_count;
    let mut keys = Vec::with_capacity(items.len());
    let mut n = 0;
    for item in items {
        let index = match item.index {
            Some(idx) => idx,
            None if !with_derived => continue,
            None => {
                // An expression already derived (e.g. the same key in GROUP BY
                // and ORDER BY) is reused.
                if let Some(existing) = derived.iter().find(|d| {
                    matches!(d.kind, DerivedKind::GroupBy | DerivedKind::OrderBy)
                        && d.expression.eq_ignore_ascii_case(&item.expression)
                }) {
                    existing.index
                } else {
                    let index = visible + derived.len();
                    derived.push(DerivedColumn {
                        kind,
                        expression: item.expression.clone(),
                        alias: format!("{alias_prefix}_{n}"),
                        index,
                    });
                    n += 1;
                    index
                }
            }
        };
        keys.push(SortKey {
            index,
            direction: item.direction,
            nulls: item
                .nulls
                .unwrap_or_else(|| stmt.dialect.default_nulls(item.direction)),
        });
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{AggregationProjection, StatementKind};
    use crate::types::Dialect;

    fn select(column_count: usize) -> BoundStatement {
        let mut stmt = BoundStatement::new(StatementKind::Select);
        stmt.projections.column_count = column_count;
        stmt
    }

    #[test]
    fn test_avg_derives_count_then_sum() {
        let mut stmt = select(2);
        stmt.projections.aggregations = vec![
            AggregationProjection::new(AggregationKind::Sum, 0, "price"),
            AggregationProjection::new(AggregationKind::Avg, 1, "price"),
        ];
        let layout = ProjectionLayout::build(&stmt, true);
        assert_eq!(layout.derived.len(), 2);
        assert_eq!(layout.derived[0].to_sql(), "COUNT(price) AS AVG_DERIVED_COUNT_0");
        assert_eq!(layout.derived[1].to_sql(), "SUM(price) AS AVG_DERIVED_SUM_0");
        assert_eq!(
            layout.avg_columns,
            vec![AvgColumns {
                avg_index: 1,
                count_index: 2,
                sum_index: 3
            }]
        );
        assert_eq!(layout.total_columns(), 4);
    }

    #[test]
    fn test_single_shard_layout_has_no_derived_columns() {
        let mut stmt = select(1);
        stmt.projections.aggregations =
            vec![AggregationProjection::new(AggregationKind::Avg, 0, "x")];
        stmt.order_by = vec![OrderByItem::derived("created_at", OrderDirection::Desc)];
        let layout = ProjectionLayout::build(&stmt, false);
        assert!(layout.derived.is_empty());
        assert!(layout.order_by.is_empty());
    }

    #[test]
    fn test_shared_group_and_order_key_derived_once() {
        let mut stmt = select(1);
        stmt.group_by = vec![OrderByItem::derived("user_id", OrderDirection::Asc)];
        stmt.order_by = vec![OrderByItem::derived("USER_ID", OrderDirection::Desc)];
        let layout = ProjectionLayout::build(&stmt, true);
        assert_eq!(layout.derived.len(), 1);
        assert_eq!(layout.derived[0].alias, "GROUP_BY_DERIVED_0");
        assert_eq!(layout.group_by[0].index, 1);
        assert_eq!(layout.order_by[0].index, 1);
        assert_eq!(layout.order_by[0].direction, OrderDirection::Desc);
    }

    #[test]
    fn test_group_without_order_sorts_by_group() {
        let mut stmt = select(2);
        stmt.group_by = vec![OrderByItem::column(0, "user_id", OrderDirection::Asc)];
        let layout = ProjectionLayout::build(&stmt, true);
        assert!(layout.order_by_from_group_by);
        assert_eq!(layout.order_by, layout.group_by);
        assert!(layout.group_by_streamable());
    }

    #[test]
    fn test_streamable_requires_group_prefix() {
        let mut stmt = select(3);
        stmt.group_by = vec![OrderByItem::column(0, "a", OrderDirection::Asc)];
        stmt.order_by = vec![OrderByItem::column(1, "b", OrderDirection::Asc)];
        assert!(!ProjectionLayout::build(&stmt, true).group_by_streamable());

        stmt.order_by = vec![
            OrderByItem::column(0, "a", OrderDirection::Desc),
            OrderByItem::column(1, "b", OrderDirection::Asc),
        ];
        assert!(ProjectionLayout::build(&stmt, true).group_by_streamable());
    }

    #[test]
    fn test_distinct_aggregate_switches_to_raw_rows() {
        let mut stmt = select(3);
        let mut distinct = AggregationProjection::new(AggregationKind::Count, 1, "user_id");
        distinct.distinct = true;
        stmt.projections.aggregations = vec![
            distinct,
            AggregationProjection::new(AggregationKind::Avg, 2, "price"),
        ];
        stmt.group_by = vec![OrderByItem::column(0, "status", OrderDirection::Asc)];

        let layout = ProjectionLayout::build(&stmt, true);
        assert!(layout.raw_rows);
        assert!(layout.avg_columns.is_empty());
        assert!(layout.derived.is_empty());
        assert!(!layout.order_by_from_group_by);
        assert_eq!(layout.order_by, layout.group_by);

        assert!(!ProjectionLayout::build(&stmt, false).raw_rows);
        stmt.projections.aggregations.remove(0);
        assert!(!ProjectionLayout::build(&stmt, true).raw_rows);
    }

    #[test]
    fn test_nulls_follow_dialect() {
        let mut stmt = select(1);
        stmt.dialect = Dialect::PostgreSql;
        stmt.order_by = vec![OrderByItem::column(0, "a", OrderDirection::Asc)];
        let layout = ProjectionLayout::build(&stmt, true);
        assert_eq!(layout.order_by[0].nulls, NullsOrder::Last);
    }
}
