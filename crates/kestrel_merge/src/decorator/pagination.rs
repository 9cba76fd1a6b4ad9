use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelResult, MergeError};

use crate::result::MergedResult;

/// Skips `offset` rows on first access, then yields at most `row_count`.
pub struct PaginationMergedResult {
    inner: Box<dyn MergedResult>,
    offset: u64,
    row_count: Option<u64>,
    skipped: bool,
    yielded: u64,
    /// Set once the inner result ran out or the page is full.
    finished: bool,
}

impl PaginationMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, offset: u64, row_count: Option<u64>) -> Self {
        Self {
            inner,
            offset,
            row_count,
            skipped: false,
            yielded: 0,
            finished: false,
        }
    }

    fn skip_offset(&mut self) -> KestrelResult<()> {
        self.skipped = true;
        for _ in 0..self.offset {
            if !self.inner.next()? {
                self.finished = true;
                break;
            }
        }
        Ok(())
    }
}

impl MergedResult for PaginationMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        if !self.skipped {
            self.skip_offset()?;
        }
        if self.finished || self.row_count.is_some_and(|limit| self.yielded >= limit) {
            self.finished = true;
            return Ok(false);
        }
        if self.inner.next()? {
            self.yielded += 1;
            Ok(true)
        } else {
            self.finished = true;
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        if self.finished || self.yielded == 0 {
            return Err(MergeError::NoCurrentRow.into());
        }
        self.inner.value(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }
}
