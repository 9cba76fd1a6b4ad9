use kestrel_common::config::KernelProps;
use kestrel_common::projection::ProjectionLayout;
use kestrel_common::statement::{AggregationProjection, BoundStatement, StatementKind};

/// Everything the merge engine needs to know about a statement.
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub kind: StatementKind,
    pub layout: ProjectionLayout,
    pub aggregations: Vec<AggregationProjection>,
    pub distinct_row: bool,
    /// Rows skipped centrally.
    pub offset: u64,
    /// Rows yielded after the offset; `None` is unbounded.
    pub row_count: Option<u64>,
    pub max_rows_buffered: usize,
}

impl MergeContext {
    /// `layout` must be the one the statement was rewritten with.
    pub fn new(stmt: &BoundStatement, layout: ProjectionLayout) -> Self {
        Self {
            kind: stmt.kind,
            layout,
            aggregations: stmt.projections.aggregations.clone(),
            distinct_row: stmt.projections.distinct_row,
            offset: 0,
            row_count: None,
            max_rows_buffered: KernelProps::default().max_rows_buffered,
        }
    }

    pub fn with_pagination(mut self, offset: u64, row_count: Option<u64>) -> Self {
        self.offset = offset;
        self.row_count = row_count;
        self
    }

    pub fn with_max_rows_buffered(mut self, max_rows_buffered: usize) -> Self {
        self.max_rows_buffered = max_rows_buffered;
        self
    }

    pub fn has_pagination(&self) -> bool {
        self.offset > 0 || self.row_count.is_some()
    }

    pub fn has_aggregations(&self) -> bool {
        !self.aggregations.is_empty()
    }
}
