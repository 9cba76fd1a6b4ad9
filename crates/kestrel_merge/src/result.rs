//! Cursors: raw shard results in, merged results out.

use std::collections::VecDeque;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::{KestrelError, KestrelResult, MergeError};

/// The result of one execution unit, as handed back by the execution
/// boundary. Forward-only; `value` reads the current row.
pub trait QueryResult: Send {
    /// Advance to the next row. Returns `false` once exhausted.
    fn next(&mut self) -> KestrelResult<bool>;

    fn value(&self, index: usize) -> KestrelResult<&Datum>;

    fn column_count(&self) -> usize;
}

/// A fully buffered result.
#[derive(Debug, Clone)]
pub struct MemoryQueryResult {
    column_count: usize,
    rows: VecDeque<OwnedRow>,
    current: Option<OwnedRow>,
}

impl MemoryQueryResult {
    pub fn new(column_count: usize, rows: Vec<OwnedRow>) -> Self {
        Self {
            column_count,
            rows: rows.into(),
            current: None,
        }
    }

    /// Column count is taken from the first row.
    pub fn from_rows(rows: Vec<Vec<Datum>>) -> Self {
        let column_count = rows.first().map_or(0, Vec::len);
        Self::new(column_count, rows.into_iter().map(OwnedRow::new).collect())
    }

    pub fn empty(column_count: usize) -> Self {
        Self::new(column_count, Vec::new())
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> KestrelResult<bool> {
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        cell(self.current.as_ref(), index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

/// A result pulled lazily from a row iterator, e.g. a driver cursor.
pub struct StreamQueryResult<I> {
    column_count: usize,
    rows: I,
    current: Option<OwnedRow>,
    exhausted: bool,
}

impl<I> StreamQueryResult<I>
where
    I: Iterator<Item = KestrelResult<OwnedRow>> + Send,
{
    pub fn new(column_count: usize, rows: I) -> Self {
        Self {
            column_count,
            rows,
            current: None,
            exhausted: false,
        }
    }
}

impl<I> QueryResult for StreamQueryResult<I>
where
    I: Iterator<Item = KestrelResult<OwnedRow>> + Send,
{
    fn next(&mut self) -> KestrelResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        match self.rows.next().transpose()? {
            Some(row) => {
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.current = None;
                self.exhausted = true;
                Ok(false)
            }
        }
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        cell(self.current.as_ref(), index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

/// The merged cursor returned to the caller. Decorators own the result they
/// wrap; dropping the outermost one releases every raw stream.
pub trait MergedResult: Send {
    /// Advance to the next row. After the first `false`, keeps returning
    /// `false`.
    fn next(&mut self) -> KestrelResult<bool>;

    /// Value of the current row. Derived columns past `column_count` are
    /// readable too.
    fn value(&self, index: usize) -> KestrelResult<&Datum>;

    /// Columns the client sees.
    fn column_count(&self) -> usize;

    fn is_null(&self, index: usize) -> KestrelResult<bool> {
        Ok(self.value(index)?.is_null())
    }

    fn get_i64(&self, index: usize) -> KestrelResult<Option<i64>> {
        let value = self.value(index)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_i64()
            .map(Some)
            .ok_or_else(|| unexpected(index, "int64", value))
    }

    fn get_f64(&self, index: usize) -> KestrelResult<Option<f64>> {
        let value = self.value(index)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| unexpected(index, "float64", value))
    }

    fn get_bool(&self, index: usize) -> KestrelResult<Option<bool>> {
        match self.value(index)? {
            Datum::Null => Ok(None),
            Datum::Boolean(b) => Ok(Some(*b)),
            other => Err(unexpected(index, "boolean", other)),
        }
    }

    /// Any non-NULL value rendered as text.
    fn get_string(&self, index: usize) -> KestrelResult<Option<String>> {
        Ok(match self.value(index)? {
            Datum::Null => None,
            Datum::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
    }

    /// The visible columns of the current row.
    fn row(&self) -> KestrelResult<OwnedRow> {
        (0..self.column_count())
            .map(|i| self.value(i).cloned())
            .collect::<KestrelResult<Vec<_>>>()
            .map(OwnedRow::new)
    }
}

/// Drain a merged result into its visible rows.
pub fn collect_rows(result: &mut dyn MergedResult) -> KestrelResult<Vec<OwnedRow>> {
    let mut rows = Vec::new();
    while result.next()? {
        rows.push(result.row()?);
    }
    Ok(rows)
}

pub(crate) fn cell(row: Option<&OwnedRow>, index: usize) -> KestrelResult<&Datum> {
    let row = row.ok_or(MergeError::NoCurrentRow)?;
    row.get(index).ok_or_else(|| {
        MergeError::ColumnOutOfBounds {
            index,
            width: row.len(),
        }
        .into()
    })
}

/// Copy the first `width` values of the current row.
pub(crate) fn read_row(result: &dyn QueryResult, width: usize) -> KestrelResult<OwnedRow> {
    (0..width)
        .map(|i| result.value(i).cloned())
        .collect::<KestrelResult<Vec<_>>>()
        .map(OwnedRow::new)
}

pub(crate) fn read_merged_row(result: &dyn MergedResult, width: usize) -> KestrelResult<OwnedRow> {
    (0..width)
        .map(|i| result.value(i).cloned())
        .collect::<KestrelResult<Vec<_>>>()
        .map(OwnedRow::new)
}

fn unexpected(index: usize, expected: &'static str, value: &Datum) -> KestrelError {
    MergeError::UnexpectedType {
        index,
        expected,
        actual: value.kind_name(),
    }
    .into()
}
