//! k-way merge of individually sorted shard streams.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::{KestrelResult, MergeError};
use kestrel_common::projection::SortKey;

use crate::compare::compare_rows;
use crate::result::{cell, read_row, MergedResult, QueryResult};

struct HeapEntry {
    row: OwnedRow,
    stream: usize,
    keys: Arc<[SortKey]>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal keys come out in stream registration order.
        compare_rows(&self.row, &other.row, &self.keys).then(self.stream.cmp(&other.stream))
    }
}

/// Merges shard streams already sorted by the ORDER BY keys. Each stream's
/// order is verified as it is advanced.
pub struct OrderByStreamMergedResult {
    streams: Vec<Box<dyn QueryResult>>,
    rows_read: Vec<u64>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    keys: Arc<[SortKey]>,
    current: Option<OwnedRow>,
    column_count: usize,
}

impl OrderByStreamMergedResult {
    pub fn new(
        mut streams: Vec<Box<dyn QueryResult>>,
        keys: &[SortKey],
        column_count: usize,
    ) -> KestrelResult<Self> {
        let keys: Arc<[SortKey]> = Arc::from(keys);
        let mut heap = BinaryHeap::with_capacity(streams.len());
        let mut rows_read = vec![0u64; streams.len()];
        for (idx, stream) in streams.iter_mut().enumerate() {
            if stream.next()? {
                rows_read[idx] = 1;
                heap.push(Reverse(HeapEntry {
                    row: read_row(stream.as_ref(), stream.column_count())?,
                    stream: idx,
                    keys: keys.clone(),
                }));
            }
        }
        Ok(Self {
            streams,
            rows_read,
            heap,
            keys,
            current: None,
            column_count,
        })
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> KestrelResult<bool> {
        let Some(Reverse(entry)) = self.heap.pop() else {
            self.current = None;
            return Ok(false);
        };
        let idx = entry.stream;
        let stream = &mut self.streams[idx];
        if stream.next()? {
            self.rows_read[idx] += 1;
            let row = read_row(stream.as_ref(), stream.column_count())?;
            if compare_rows(&row, &entry.row, &self.keys) == Ordering::Less {
                return Err(MergeError::UnsortedStream {
                    stream: idx,
                    row: self.rows_read[idx],
                }
                .into());
            }
            self.heap.push(Reverse(HeapEntry {
                row,
                stream: idx,
                keys: self.keys.clone(),
            }));
        }
        self.current = Some(entry.row);
        Ok(true)
    }

    fn value(&self, index: usize) -> KestrelResult<&Datum> {
        cell(self.current.as_ref(), index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{collect_rows, MemoryQueryResult};
    use kestrel_common::statement::{NullsOrder, OrderDirection};

    fn stream(rows: &[(i64, &str)]) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::from_rows(
            rows.iter()
                .map(|(k, tag)| vec![Datum::Int64(*k), Datum::Text(tag.to_string())])
                .collect(),
        ))
    }

    fn asc() -> Vec<SortKey> {
        vec![SortKey {
            index: 0,
            direction: OrderDirection::Asc,
            nulls: NullsOrder::First,
        }]
    }

    fn tags(rows: &[OwnedRow]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.get(1)?.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_merge_sorted_streams_with_ties_by_registration() {
        let streams = vec![
            stream(&[(1, "a1"), (4, "a4"), (4, "a4'")]),
            stream(&[(2, "b2"), (4, "b4")]),
            stream(&[]),
            stream(&[(0, "c0")]),
        ];
        let mut merged = OrderByStreamMergedResult::new(streams, &asc(), 2).unwrap();
        let rows = collect_rows(&mut merged).unwrap();
        assert_eq!(tags(&rows), vec!["c0", "a1", "b2", "a4", "a4'", "b4"]);
        assert!(!merged.next().unwrap());
    }

    #[test]
    fn test_unsorted_stream_detected() {
        let streams = vec![stream(&[(1, "a"), (5, "b"), (3, "c")]), stream(&[(2, "d")])];
        let mut merged = OrderByStreamMergedResult::new(streams, &asc(), 2).unwrap();
        let err = collect_rows(&mut merged).unwrap_err();
        assert!(matches!(
            err,
            kestrel_common::error::KestrelError::Merge(MergeError::UnsortedStream { stream: 0, row: 3 })
        ));
    }
}
