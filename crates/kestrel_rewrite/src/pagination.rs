//! Pagination context.
//!
//! A statement paginated on several shards cannot keep its offset: shard k
//! does not know how many rows the others contribute before its own. Each
//! shard is instead asked for the first `offset + row_count` rows and the
//! merger skips `offset` rows centrally.
//!
//! Row-number style bounds (`ROWNUM > x AND ROWNUM <= y`, `TOP`) carry row
//! numbers rather than counts; they are normalized here so the merger always
//! sees "skip N, then yield M".

use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelResult, RouteError};
use kestrel_common::statement::{Pagination, PaginationSegment, PaginationStyle, PaginationValue};

/// Row count asked of every shard when groups must be merged in memory.
pub const UNBOUNDED_ROW_COUNT: u64 = i32::MAX as u64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationContext {
    style: PaginationStyle,
    offset_segment: Option<PaginationSegment>,
    row_count_segment: Option<PaginationSegment>,
    /// Raw values as written or bound.
    offset_value: u64,
    row_count_value: Option<u64>,
    /// Normalized: rows to skip, rows to yield.
    offset: u64,
    row_count: Option<u64>,
}

impl PaginationContext {
    pub fn new(pagination: Option<&Pagination>, params: &[Datum]) -> KestrelResult<Self> {
        let Some(pagination) = pagination else {
            return Ok(Self::default());
        };
        let offset_value = match &pagination.offset {
            Some(segment) => resolve(segment, params)?,
            None => 0,
        };
        let row_count_value = match &pagination.row_count {
            Some(segment) => Some(resolve(segment, params)?),
            None => None,
        };
        let (offset, row_count) = match pagination.style {
            PaginationStyle::Limit => (offset_value, row_count_value),
            PaginationStyle::RowNumber => {
                // `ROWNUM > x` skips x rows, `ROWNUM >= x` skips x - 1.
                let offset = match &pagination.offset {
                    Some(s) if !s.bound_opened => offset_value.saturating_sub(1),
                    _ => offset_value,
                };
                // `ROWNUM < y` ends at row y - 1, `ROWNUM <= y` at row y.
                let last_row = match (&pagination.row_count, row_count_value) {
                    (Some(s), Some(v)) if s.bound_opened => Some(v.saturating_sub(1)),
                    (_, v) => v,
                };
                (offset, last_row.map(|last| last.saturating_sub(offset)))
            }
        };
        Ok(Self {
            style: pagination.style,
            offset_segment: pagination.offset,
            row_count_segment: pagination.row_count,
            offset_value,
            row_count_value,
            offset,
            row_count,
        })
    }

    pub fn has_pagination(&self) -> bool {
        self.offset_segment.is_some() || self.row_count_segment.is_some()
    }

    pub fn offset_segment(&self) -> Option<&PaginationSegment> {
        self.offset_segment.as_ref()
    }

    pub fn row_count_segment(&self) -> Option<&PaginationSegment> {
        self.row_count_segment.as_ref()
    }

    /// Rows the merger skips.
    pub fn actual_offset(&self) -> u64 {
        self.offset
    }

    /// Rows the merger yields after skipping; `None` is unbounded.
    pub fn actual_row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Offset written into each shard's statement.
    pub fn revised_offset(&self) -> u64 {
        0
    }

    /// Row count written into each shard's statement. `unbounded` is set
    /// when groups are merged in memory and every shard must return all of
    /// its groups.
    pub fn revised_row_count(&self, unbounded: bool) -> Option<u64> {
        if unbounded {
            return self.row_count_value.map(|_| UNBOUNDED_ROW_COUNT);
        }
        match self.style {
            PaginationStyle::Limit => self
                .row_count_value
                .map(|count| self.offset_value.saturating_add(count)),
            // The upper bound is already a row number counted from the start.
            PaginationStyle::RowNumber => self.row_count_value,
        }
    }
}

fn resolve(segment: &PaginationSegment, params: &[Datum]) -> KestrelResult<u64> {
    match segment.value {
        PaginationValue::Literal(v) => Ok(v),
        PaginationValue::Parameter(idx) => {
            let value = params
                .get(idx)
                .ok_or(RouteError::ParameterMissing(idx))?;
            value
                .as_i64()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| {
                    RouteError::InvalidCondition(format!(
                        "pagination parameter {idx} is not a non-negative integer: {value}"
                    ))
                    .into()
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(value: PaginationValue, bound_opened: bool) -> PaginationSegment {
        PaginationSegment {
            start: 0,
            stop: 0,
            value,
            bound_opened,
        }
    }

    fn limit(offset: Option<u64>, row_count: Option<u64>) -> Pagination {
        Pagination {
            style: PaginationStyle::Limit,
            offset: offset.map(|v| segment(PaginationValue::Literal(v), false)),
            row_count: row_count.map(|v| segment(PaginationValue::Literal(v), false)),
        }
    }

    #[test]
    fn test_limit_offset_revision() {
        let ctx = PaginationContext::new(Some(&limit(Some(10), Some(5))), &[]).unwrap();
        assert!(ctx.has_pagination());
        assert_eq!(ctx.actual_offset(), 10);
        assert_eq!(ctx.actual_row_count(), Some(5));
        assert_eq!(ctx.revised_offset(), 0);
        assert_eq!(ctx.revised_row_count(false), Some(15));
        assert_eq!(ctx.revised_row_count(true), Some(UNBOUNDED_ROW_COUNT));
    }

    #[test]
    fn test_offset_only() {
        let ctx = PaginationContext::new(Some(&limit(Some(3), None)), &[]).unwrap();
        assert_eq!(ctx.actual_row_count(), None);
        assert_eq!(ctx.revised_row_count(false), None);
    }

    #[test]
    fn test_no_pagination() {
        let ctx = PaginationContext::new(None, &[]).unwrap();
        assert!(!ctx.has_pagination());
        assert_eq!(ctx.actual_offset(), 0);
        assert_eq!(ctx.actual_row_count(), None);
    }

    #[test]
    fn test_parameter_bound_values() {
        let pagination = Pagination {
            style: PaginationStyle::Limit,
            offset: Some(segment(PaginationValue::Parameter(1), false)),
            row_count: Some(segment(PaginationValue::Parameter(0), false)),
        };
        let params = vec![Datum::Int32(5), Datum::Int64(10)];
        let ctx = PaginationContext::new(Some(&pagination), &params).unwrap();
        assert_eq!(ctx.actual_offset(), 10);
        assert_eq!(ctx.revised_row_count(false), Some(15));

        let negative = vec![Datum::Int32(5), Datum::Int64(-1)];
        assert!(PaginationContext::new(Some(&pagination), &negative)
            .unwrap_err()
            .is_user_error());
        assert!(PaginationContext::new(Some(&pagination), &[]).is_err());
    }

    #[test]
    fn test_row_number_bounds() {
        // ROWNUM > 10 AND ROWNUM <= 15
        let pagination = Pagination {
            style: PaginationStyle::RowNumber,
            offset: Some(segment(PaginationValue::Literal(10), true)),
            row_count: Some(segment(PaginationValue::Literal(15), false)),
        };
        let ctx = PaginationContext::new(Some(&pagination), &[]).unwrap();
        assert_eq!(ctx.actual_offset(), 10);
        assert_eq!(ctx.actual_row_count(), Some(5));
        assert_eq!(ctx.revised_row_count(false), Some(15));

        // ROWNUM >= 11 AND ROWNUM < 16 selects the same rows.
        let pagination = Pagination {
            style: PaginationStyle::RowNumber,
            offset: Some(segment(PaginationValue::Literal(11), false)),
            row_count: Some(segment(PaginationValue::Literal(16), true)),
        };
        let ctx = PaginationContext::new(Some(&pagination), &[]).unwrap();
        assert_eq!(ctx.actual_offset(), 10);
        assert_eq!(ctx.actual_row_count(), Some(5));
    }
}
