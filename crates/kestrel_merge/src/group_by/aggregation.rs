//! Aggregation units: combine per-shard aggregate values into one.

use std::collections::BTreeSet;

use kestrel_common::datum::{comparable, compare_datum, Datum, OwnedRow};
use kestrel_common::error::{KestrelResult, MergeError};
use kestrel_common::projection::ProjectionLayout;
use kestrel_common::statement::{AggregationKind, AggregationProjection};

use crate::compare::RowKey;
use crate::result::cell;

pub trait AggregationUnit: Send {
    /// Fold in the input values of one row.
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()>;

    fn result(&self) -> KestrelResult<Datum>;
}

/// SUM and pushed-down COUNT: partial results add up.
#[derive(Debug)]
pub struct AccumulationUnit {
    total: Datum,
    zero_when_empty: bool,
}

impl AccumulationUnit {
    pub fn sum() -> Self {
        Self {
            total: Datum::Null,
            zero_when_empty: false,
        }
    }

    pub fn count() -> Self {
        Self {
            total: Datum::Null,
            zero_when_empty: true,
        }
    }
}

impl AggregationUnit for AccumulationUnit {
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()> {
        let Some(value) = values.first() else {
            return Ok(());
        };
        self.total = add(&self.total, value)?;
        Ok(())
    }

    fn result(&self) -> KestrelResult<Datum> {
        if self.total.is_null() && self.zero_when_empty {
            return Ok(Datum::Int64(0));
        }
        Ok(self.total.clone())
    }
}

/// MAX and MIN.
#[derive(Debug)]
pub struct ComparableUnit {
    keep: std::cmp::Ordering,
    best: Option<Datum>,
}

impl ComparableUnit {
    pub fn max() -> Self {
        Self {
            keep: std::cmp::Ordering::Greater,
            best: None,
        }
    }

    pub fn min() -> Self {
        Self {
            keep: std::cmp::Ordering::Less,
            best: None,
        }
    }
}

impl AggregationUnit for ComparableUnit {
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()> {
        let Some(&value) = values.first() else {
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        match &self.best {
            None => self.best = Some(value.clone()),
            Some(best) => {
                if !comparable(best, value) {
                    return Err(MergeError::TypeMismatch {
                        op: "compare",
                        left: best.kind_name(),
                        right: value.kind_name(),
                    }
                    .into());
                }
                if compare_datum(value, best) == self.keep {
                    self.best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> KestrelResult<Datum> {
        Ok(self.best.clone().unwrap_or(Datum::Null))
    }
}

/// AVG recombined from derived COUNT and SUM columns (`values` = count, sum),
/// or computed centrally from raw values (`values` = the argument).
#[derive(Debug)]
pub struct AverageUnit {
    count: Datum,
    sum: Datum,
    central: bool,
}

impl AverageUnit {
    pub fn from_partials() -> Self {
        Self {
            count: Datum::Null,
            sum: Datum::Null,
            central: false,
        }
    }

    pub fn central() -> Self {
        Self {
            central: true,
            ..Self::from_partials()
        }
    }
}

impl AggregationUnit for AverageUnit {
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()> {
        if self.central {
            if let Some(&value) = values.first().filter(|v| !v.is_null()) {
                self.count = add(&self.count, &Datum::Int64(1))?;
                self.sum = add(&self.sum, value)?;
            }
            return Ok(());
        }
        if let [count, sum] = values {
            self.count = add(&self.count, count)?;
            self.sum = add(&self.sum, sum)?;
        }
        Ok(())
    }

    fn result(&self) -> KestrelResult<Datum> {
        if self.count.is_null() || self.sum.is_null() {
            return Ok(Datum::Null);
        }
        self.sum.divide(&self.count).ok_or_else(|| {
            MergeError::TypeMismatch {
                op: "divide",
                left: self.sum.kind_name(),
                right: self.count.kind_name(),
            }
            .into()
        })
    }
}

/// COUNT computed centrally: counts non-NULL raw values.
#[derive(Debug, Default)]
pub struct CountingUnit {
    count: i64,
}

impl AggregationUnit for CountingUnit {
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()> {
        if values.first().is_some_and(|v| !v.is_null()) {
            self.count += 1;
        }
        Ok(())
    }

    fn result(&self) -> KestrelResult<Datum> {
        Ok(Datum::Int64(self.count))
    }
}

/// `AGG(DISTINCT x)`: feeds each distinct non-NULL value to `inner` once.
pub struct DistinctUnit {
    seen: BTreeSet<RowKey>,
    inner: Box<dyn AggregationUnit>,
}

impl DistinctUnit {
    pub fn new(inner: Box<dyn AggregationUnit>) -> Self {
        Self {
            seen: BTreeSet::new(),
            inner,
        }
    }
}

impl AggregationUnit for DistinctUnit {
    fn merge(&mut self, values: &[&Datum]) -> KestrelResult<()> {
        let Some(&value) = values.first() else {
            return Ok(());
        };
        if value.is_null() || !self.seen.insert(RowKey::single(value)) {
            return Ok(());
        }
        self.inner.merge(values)
    }

    fn result(&self) -> KestrelResult<Datum> {
        self.inner.result()
    }
}

fn add(total: &Datum, value: &Datum) -> KestrelResult<Datum> {
    total.add(value).ok_or_else(|| {
        MergeError::TypeMismatch {
            op: "add",
            left: total.kind_name(),
            right: value.kind_name(),
        }
        .into()
    })
}

/// How to compute one aggregate column of a merged row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    kind: AggregationKind,
    /// Output column.
    index: usize,
    /// Columns read from each shard row.
    inputs: Vec<usize>,
    central: bool,
    distinct: bool,
}

impl AggregationSpec {
    fn create_unit(&self) -> Box<dyn AggregationUnit> {
        let unit: Box<dyn AggregationUnit> = match (self.kind, self.central) {
            (AggregationKind::Count, true) => Box::new(CountingUnit::default()),
            (AggregationKind::Count, false) => Box::new(AccumulationUnit::count()),
            (AggregationKind::Sum, _) => Box::new(AccumulationUnit::sum()),
            (AggregationKind::Avg, true) => Box::new(AverageUnit::central()),
            (AggregationKind::Avg, false) => Box::new(AverageUnit::from_partials()),
            (AggregationKind::Max, _) => Box::new(ComparableUnit::max()),
            (AggregationKind::Min, _) => Box::new(ComparableUnit::min()),
        };
        if self.distinct {
            Box::new(DistinctUnit::new(unit))
        } else {
            unit
        }
    }
}

/// Aggregate columns of a statement, resolved against its layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationPlan {
    specs: Vec<AggregationSpec>,
}

impl AggregationPlan {
    pub fn new(aggregations: &[AggregationProjection], layout: &ProjectionLayout) -> Self {
        let specs = aggregations
            .iter()
            .map(|agg| {
                let central = layout.raw_rows || agg.computed_centrally();
                let derived = layout.avg_columns.iter().find(|c| c.avg_index == agg.index);
                match (agg.kind, derived) {
                    (AggregationKind::Avg, Some(cols)) if !central => AggregationSpec {
                        kind: agg.kind,
                        index: agg.index,
                        inputs: vec![cols.count_index, cols.sum_index],
                        central: false,
                        distinct: false,
                    },
                    // Without derived columns an AVG can only be averaged from raw values.
                    (AggregationKind::Avg, None) => AggregationSpec {
                        kind: agg.kind,
                        index: agg.index,
                        inputs: vec![agg.index],
                        central: true,
                        distinct: agg.distinct,
                    },
                    _ => AggregationSpec {
                        kind: agg.kind,
                        index: agg.index,
                        inputs: vec![agg.index],
                        central,
                        distinct: agg.distinct,
                    },
                }
            })
            .collect();
        Self { specs }
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub(crate) fn start(&self) -> Vec<AggregationColumn> {
        self.specs
            .iter()
            .map(|spec| AggregationColumn {
                index: spec.index,
                inputs: spec.inputs.clone(),
                unit: spec.create_unit(),
            })
            .collect()
    }
}

pub(crate) struct AggregationColumn {
    index: usize,
    inputs: Vec<usize>,
    unit: Box<dyn AggregationUnit>,
}

impl AggregationColumn {
    pub(crate) fn merge(&mut self, row: &OwnedRow) -> KestrelResult<()> {
        let values = self
            .inputs
            .iter()
            .map(|&i| cell(Some(row), i))
            .collect::<KestrelResult<Vec<&Datum>>>()?;
        self.unit.merge(&values)
    }

    /// Write the aggregate into its output column of `row`.
    pub(crate) fn finish(&self, row: &mut OwnedRow) -> KestrelResult<()> {
        let width = row.len();
        let slot = row
            .values
            .get_mut(self.index)
            .ok_or(MergeError::ColumnOutOfBounds {
                index: self.index,
                width,
            })?;
        *slot = self.unit.result()?;
        Ok(())
    }
}
