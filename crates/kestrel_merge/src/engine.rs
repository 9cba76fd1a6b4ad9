//! Merge engine: picks the base merger for a statement and stacks the
//! decorators on top.

use kestrel_common::error::KestrelResult;
use kestrel_common::statement::StatementKind;

use crate::context::MergeContext;
use crate::decorator::{DistinctMergedResult, PaginationMergedResult};
use crate::group_by::memory::MemoryGrouping;
use crate::group_by::{AggregationPlan, GroupByMemoryMergedResult, GroupByStreamMergedResult};
use crate::result::{MergedResult, QueryResult};
use crate::stream::{IteratorStreamMergedResult, OrderByStreamMergedResult, TransparentMergedResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// One stream: the shard ran the whole statement.
    Transparent,
    Iterator,
    OrderByStream,
    GroupByStream,
    GroupByMemory,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Transparent => "transparent",
            MergeStrategy::Iterator => "iterator",
            MergeStrategy::OrderByStream => "order_by_stream",
            MergeStrategy::GroupByStream => "group_by_stream",
            MergeStrategy::GroupByMemory => "group_by_memory",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn strategy(ctx: &MergeContext, stream_count: usize) -> MergeStrategy {
        let layout = &ctx.layout;
        if stream_count == 1 {
            MergeStrategy::Transparent
        } else if ctx.kind != StatementKind::Select {
            MergeStrategy::Iterator
        } else if !layout.group_by.is_empty() {
            // Raw rows arrive unordered.
            if layout.group_by_streamable() && !layout.raw_rows {
                MergeStrategy::GroupByStream
            } else {
                MergeStrategy::GroupByMemory
            }
        } else if ctx.has_aggregations() {
            MergeStrategy::GroupByMemory
        } else if !layout.order_by.is_empty() {
            MergeStrategy::OrderByStream
        } else {
            MergeStrategy::Iterator
        }
    }

    /// Merge the raw results of one statement, in route unit order.
    ///
    /// Base union, then grouping, then distinct, then pagination. Distinct
    /// sits below pagination so a page counts distinct rows.
    pub fn merge(
        &self,
        mut streams: Vec<Box<dyn QueryResult>>,
        ctx: &MergeContext,
    ) -> KestrelResult<Box<dyn MergedResult>> {
        let strategy = Self::strategy(ctx, streams.len());
        tracing::debug!(
            strategy = strategy.as_str(),
            streams = streams.len(),
            "merging results"
        );
        if strategy == MergeStrategy::Transparent {
            if let Some(stream) = streams.pop() {
                return Ok(Box::new(TransparentMergedResult::new(stream)));
            }
        }

        let layout = &ctx.layout;
        let visible = if layout.visible_columns > 0 {
            layout.visible_columns
        } else {
            streams.first().map_or(0, |s| s.column_count())
        };
        let width = layout.total_columns().max(visible);
        let plan = AggregationPlan::new(&ctx.aggregations, layout);
        let group_columns: Vec<usize> = layout.group_by.iter().map(|k| k.index).collect();

        let mut result: Box<dyn MergedResult> = match strategy {
            MergeStrategy::Transparent | MergeStrategy::Iterator => {
                Box::new(IteratorStreamMergedResult::new(streams, visible))
            }
            MergeStrategy::OrderByStream => Box::new(OrderByStreamMergedResult::new(
                streams,
                &layout.order_by,
                visible,
            )?),
            MergeStrategy::GroupByStream => {
                let ordered = OrderByStreamMergedResult::new(streams, &layout.order_by, visible)?;
                Box::new(GroupByStreamMergedResult::new(
                    Box::new(ordered),
                    group_columns,
                    plan,
                    width,
                    visible,
                )?)
            }
            MergeStrategy::GroupByMemory => Box::new(GroupByMemoryMergedResult::new(
                streams,
                &MemoryGrouping {
                    group_columns: &group_columns,
                    order_keys: &layout.order_by,
                    plan: &plan,
                    width,
                    max_groups: ctx.max_rows_buffered,
                },
                visible,
            )?),
        };

        if ctx.distinct_row {
            result = Box::new(DistinctMergedResult::on_columns(result, (0..visible).collect()));
        }
        if ctx.has_pagination() {
            result = Box::new(PaginationMergedResult::new(result, ctx.offset, ctx.row_count));
        }
        Ok(result)
    }
}
