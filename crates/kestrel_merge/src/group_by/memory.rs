use std::collections::BTreeMap;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::{KestrelResult, MergeError};
use kestrel_common::projection::SortKey;

use super::{AggregationPlan, GroupState};
use crate::compare::{compare_rows, RowKey};
use crate::result::{cell, read_row, MergedResult, QueryResult};

/// Reads every shard row, groups in memory, then sorts the groups.
///
/// At most `max_groups` groups are held; one more is a resource error.
pub struct GroupByMemoryMergedResult {
    rows: std::vec::IntoIter<OwnedRow>,
    current: Option<OwnedRow>,
    column_count: usize,
}

/// Shape of a memory group merge.
#[derive(Debug, Clone)]
pub struct MemoryGrouping<'a> {
    pub group_columns: &'a [usize],
    pub order_keys: &'a [SortKey],
    pub plan: &'a AggregationPlan,
    /// Width of the row emitted when there is nothing to group.
    pub width: usize,
    pub max_groups: usize,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        mut streams: Vec<Box<dyn QueryResult>>,
        grouping: &MemoryGrouping<'_>,
        column_count: usize,
    ) -> KestrelResult<Self> {
        let mut groups: BTreeMap<RowKey, GroupState> = BTreeMap::new();
        for stream in &mut streams {
            while stream.next()? {
                let row = read_row(stream.as_ref(), stream.column_count())?;
                let key = RowKey::project(&row, grouping.group_columns);
                if let Some(group) = groups.get_mut(&key) {
                    group.merge(&row)?;
                    continue;
                }
                if groups.len() >= grouping.max_groups {
                    return Err(MergeError::RowLimitExceeded {
                        rows: groups.len() + 1,
                        limit: grouping.max_groups,
                    }
                    .into());
                }
                groups.insert(key, GroupState::new(row, grouping.plan)?);
            }
        }
        // Shards are released as soon as they are drained.
        drop(streams);

        // An aggregate without GROUP BY yields one row even over no input.
        if groups.is_empty() && grouping.group_columns.is_empty() && !grouping.plan.is_empty() {
            let empty = GroupState::empty(grouping.width, grouping.plan);
            return Ok(Self::from_rows(vec![empty.finish()?], column_count));
        }

        let mut rows = groups
            .into_values()
            .map(GroupState::finish)
            .collect::<KestrelResult<Vec<_>>>()?;
        if !grouping.order_keys.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, grouping.order_keys));
        }
        tracing::debug!(groups = rows.len(), "memory group merge complete");
        Ok(Self::from_rows(rows, column_count))
    }

    fn from_rows(rows: Vec<OwnedRow>, column_count: usize) -> Self {
        Self {
            rows: rows.into_iter(),
            current: None,
            column_count,
        }
    }
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        cell(self.current.as_ref(), index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{collect_rows, MemoryQueryResult};
    use kestrel_common::projection::ProjectionLayout;
    use kestrel_common::statement::{
        AggregationKind, AggregationProjection, BoundStatement, NullsOrder, OrderDirection,
        StatementKind,
    };

    fn int(v: i64) -> Datum {
        Datum::Int64(v)
    }

    fn shard(rows: Vec<Vec<Datum>>) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::from_rows(rows))
    }

    fn count_plan() -> AggregationPlan {
        let mut stmt = BoundStatement::new(StatementKind::Select);
        stmt.projections.column_count = 2;
        stmt.projections.aggregations =
            vec![AggregationProjection::new(AggregationKind::Count, 1, "*")];
        let layout = ProjectionLayout::build(&stmt, true);
        AggregationPlan::new(&stmt.projections.aggregations, &layout)
    }

    #[test]
    fn test_groups_sorted_by_order_keys() {
        let plan = count_plan();
        let order = [SortKey {
            index: 1,
            direction: OrderDirection::Desc,
            nulls: NullsOrder::First,
        }];
        let grouping = MemoryGrouping {
            group_columns: &[0],
            order_keys: &order,
            plan: &plan,
            width: 2,
            max_groups: 10,
        };
        let streams = vec![
            shard(vec![vec![int(1), int(2)], vec![int(2), int(5)]]),
            shard(vec![vec![int(1), int(4)], vec![int(3), int(1)]]),
        ];
        let mut merged = GroupByMemoryMergedResult::new(streams, &grouping, 2).unwrap();
        let rows = collect_rows(&mut merged).unwrap();
        let pairs: Vec<(i64, i64)> = rows
            .iter()
            .map(|r| (r.values[0].as_i64().unwrap(), r.values[1].as_i64().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(1, 6), (2, 5), (3, 1)]);
    }

    #[test]
    fn test_group_limit_is_resource_error() {
        let plan = count_plan();
        let grouping = MemoryGrouping {
            group_columns: &[0],
            order_keys: &[],
            plan: &plan,
            width: 2,
            max_groups: 2,
        };
        let streams = vec![shard(vec![
            vec![int(1), int(1)],
            vec![int(2), int(1)],
            vec![int(1), int(1)],
            vec![int(3), int(1)],
        ])];
        let err = GroupByMemoryMergedResult::new(streams, &grouping, 2)
            .err()
            .unwrap();
        assert_eq!(err.kind(), kestrel_common::error::ErrorKind::Resource);
    }

    #[test]
    fn test_aggregate_over_no_rows_yields_one_row() {
        let plan = count_plan();
        let grouping = MemoryGrouping {
            group_columns: &[],
            order_keys: &[],
            plan: &plan,
            width: 2,
            max_groups: 10,
        };
        let streams = vec![shard(vec![]), shard(vec![])];
        let mut merged = GroupByMemoryMergedResult::new(streams, &grouping, 2).unwrap();
        assert!(merged.next().unwrap());
        assert!(merged.value(0).unwrap().is_null());
        assert_eq!(merged.get_i64(1).unwrap(), Some(0));
        assert!(!merged.next().unwrap());
        assert!(!merged.next().unwrap());
    }
}
