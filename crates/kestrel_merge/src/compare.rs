//! Row ordering and row keys.

use std::cmp::Ordering;

use kestrel_common::datum::{compare_datum, Datum, OwnedRow};
use kestrel_common::projection::SortKey;
use kestrel_common::statement::{NullsOrder, OrderDirection};

static NULL: Datum = Datum::Null;

/// Compare two rows on `keys`, honouring each key's direction and NULL
/// placement.
pub fn compare_rows(a: &OwnedRow, b: &OwnedRow, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(key.index).unwrap_or(&NULL);
        let right = b.get(key.index).unwrap_or(&NULL);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => nulls_first(key.nulls),
            (false, true) => nulls_first(key.nulls).reverse(),
            (false, false) => match key.direction {
                OrderDirection::Asc => compare_datum(left, right),
                OrderDirection::Desc => compare_datum(left, right).reverse(),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn nulls_first(nulls: NullsOrder) -> Ordering {
    match nulls {
        NullsOrder::First => Ordering::Less,
        NullsOrder::Last => Ordering::Greater,
    }
}

/// Values of a row used for grouping or deduplication, ordered column by
/// column with `compare_datum` so NULLs group together.
#[derive(Debug, Clone)]
pub(crate) struct RowKey(Vec<Datum>);

impl RowKey {
    pub(crate) fn project(row: &OwnedRow, columns: &[usize]) -> Self {
        Self(
            columns
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(Datum::Null))
                .collect(),
        )
    }

    pub(crate) fn single(value: &Datum) -> Self {
        Self(vec![value.clone()])
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            let ord = compare_datum(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}
