use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::KestrelResult;

use super::{AggregationPlan, GroupState};
use crate::compare::RowKey;
use crate::result::{cell, read_merged_row, MergedResult};

/// Groups rows arriving contiguously from an ordered merge, one group at a
/// time.
pub struct GroupByStreamMergedResult {
    input: Box<dyn MergedResult>,
    group_columns: Vec<usize>,
    plan: AggregationPlan,
    /// Columns read from each input row, derived ones included.
    width: usize,
    /// First row of the next group, already read from `input`.
    pending: Option<OwnedRow>,
    current: Option<OwnedRow>,
    column_count: usize,
}

impl GroupByStreamMergedResult {
    pub fn new(
        mut input: Box<dyn MergedResult>,
        group_columns: Vec<usize>,
        plan: AggregationPlan,
        width: usize,
        column_count: usize,
    ) -> KestrelResult<Self> {
        let pending = if input.next()? {
            Some(read_merged_row(input.as_ref(), width)?)
        } else {
            None
        };
        Ok(Self {
            input,
            group_columns,
            plan,
            width,
            pending,
            current: None,
            column_count,
        })
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        let Some(first) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };
        let key = RowKey::project(&first, &self.group_columns);
        let mut group = GroupState::new(first, &self.plan)?;
        while self.input.next()? {
            let row = read_merged_row(self.input.as_ref(), self.width)?;
            if RowKey::project(&row, &self.group_columns) == key {
                group.merge(&row)?;
            } else {
                self.pending = Some(row);
                break;
            }
        }
        self.current = Some(group.finish()?);
        Ok(true)
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        cell(self.current.as_ref(), index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}
