use kestrel_common::datum::Datum;
use kestrel_common::error::KestrelResult;

use crate::result::{MergedResult, QueryResult};

/// A single shard ran the whole statement; its result is passed through.
pub struct TransparentMergedResult {
    inner: Box<dyn QueryResult>,
    exhausted: bool,
}

impl TransparentMergedResult {
    pub fn new(inner: Box<dyn QueryResult>) -> Self {
        Self {
            inner,
            exhausted: false,
        }
    }
}

impl MergedResult for TransparentMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let more = self.inner.next()?;
        self.exhausted = !more;
        Ok(more)
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        self.inner.value(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }
}
