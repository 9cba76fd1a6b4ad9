//! Group-by merging with aggregation.
//!
//! Streamed when every shard returns its groups contiguously (the grouping
//! columns lead the ordering), otherwise materialized in memory.

pub mod aggregation;
pub mod memory;
pub mod stream;

pub use aggregation::{AggregationPlan, AggregationUnit};
pub use memory::GroupByMemoryMergedResult;
pub use stream::GroupByStreamMergedResult;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::KestrelResult;

use aggregation::AggregationColumn;

/// One group being accumulated: the first row carries the non-aggregate
/// columns, the units the aggregates.
pub(crate) struct GroupState {
    row: OwnedRow,
    columns: Vec<AggregationColumn>,
}

impl GroupState {
    pub(crate) fn new(row: OwnedRow, plan: &AggregationPlan) -> KestrelResult<Self> {
        let mut state = Self {
            columns: plan.start(),
            row,
        };
        for column in &mut state.columns {
            column.merge(&state.row)?;
        }
        Ok(state)
    }

    /// The single group of an aggregation over no rows at all.
    pub(crate) fn empty(width: usize, plan: &AggregationPlan) -> Self {
        Self {
            row: OwnedRow::new(vec![Datum::Null; width]),
            columns: plan.start(),
        }
    }

    pub(crate) fn merge(&mut self, row: &OwnedRow) -> KestrelResult<()> {
        for column in &mut self.columns {
            column.merge(row)?;
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> KestrelResult<OwnedRow> {
        let mut row = self.row;
        for column in &self.columns {
            column.finish(&mut row)?;
        }
        Ok(row)
    }
}
