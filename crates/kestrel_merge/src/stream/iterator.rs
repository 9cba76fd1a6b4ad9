use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelResult, MergeError};

use crate::result::{MergedResult, QueryResult};

/// Drains streams one after another in registration order.
pub struct IteratorStreamMergedResult {
    streams: Vec<Box<dyn QueryResult>>,
    position: usize,
    on_row: bool,
    column_count: usize,
}

impl IteratorStreamMergedResult {
    pub fn new(streams: Vec<Box<dyn QueryResult>>, column_count: usize) -> Self {
        Self {
            streams,
            position: 0,
            on_row: false,
            column_count,
        }
    }
}

impl MergedResult for IteratorStreamMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        while let Some(stream) = self.streams.get_mut(self.position) {
            if stream.next()? {
                self.on_row = true;
                return Ok(true);
            }
            self.position += 1;
        }
        self.on_row = false;
        Ok(false)
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        match self.streams.get(self.position) {
            Some(stream) if self.on_row => stream.value(index),
            _ => Err(MergeError::NoCurrentRow.into()),
        }
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{collect_rows, MemoryQueryResult};

    fn stream(values: &[i64]) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::from_rows(
            values.iter().map(|v| vec![Datum::Int64(*v)]).collect(),
        ))
    }

    #[test]
    fn test_streams_drained_in_registration_order() {
        let mut merged =
            IteratorStreamMergedResult::new(vec![stream(&[3, 1]), stream(&[]), stream(&[2])], 1);
        let rows = collect_rows(&mut merged).unwrap();
        let values: Vec<i64> = rows.iter().filter_map(|r| r.get(0)?.as_i64()).collect();
        assert_eq!(values, vec![3, 1, 2]);
        assert!(!merged.next().unwrap());
        assert!(merged.value(0).is_err());
    }
}
