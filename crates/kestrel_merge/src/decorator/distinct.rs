use std::collections::BTreeSet;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::KestrelResult;

use crate::compare::RowKey;
use crate::result::{read_merged_row, MergedResult};

/// Suppresses rows whose dedup columns were already seen. Holds one key per
/// distinct tuple.
pub struct DistinctMergedResult {
    inner: Box<dyn MergedResult>,
    columns: Vec<usize>,
    seen: BTreeSet<RowKey>,
}

impl DistinctMergedResult {
    /// Dedup on every visible column.
    pub fn new(inner: Box<dyn MergedResult>) -> Self {
        let columns = (0..inner.column_count()).collect();
        Self::on_columns(inner, columns)
    }

    pub fn on_columns(inner: Box<dyn MergedResult>, columns: Vec<usize>) -> Self {
        Self {
            inner,
            columns,
            seen: BTreeSet::new(),
        }
    }
}

impl MergedResult for DistinctMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        while self.inner.next()? {
            let width = self.columns.iter().max().map_or(0, |m| m + 1);
            let row: OwnedRow = read_merged_row(self.inner.as_ref(), width)?;
            if self.seen.insert(RowKey::project(&row, &self.columns)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        self.inner.value(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }
}
