//! Sharding algorithm contracts and the values they receive.
//!
//! An algorithm maps sharding values onto a subset of the available targets.
//! Targets are data source names for database strategies and actual table
//! names for table strategies; the caller passes them in node order and
//! expects results drawn from that set.

pub mod inline;
pub mod modulo;
pub mod range;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use kestrel_common::datum::{compare_datum, Datum};
use kestrel_common::error::{ConfigError, KestrelResult, RouteError};

pub use inline::{ComplexInlineShardingAlgorithm, HintInlineShardingAlgorithm, InlineShardingAlgorithm};
pub use modulo::{HashModShardingAlgorithm, ModShardingAlgorithm};
pub use range::{BoundaryRangeShardingAlgorithm, VolumeRangeShardingAlgorithm};

/// One concrete value of a sharding column (`=` or an `IN` member).
#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a Datum,
}

/// A range on a sharding column (`<`, `>=`, `BETWEEN`, ...).
#[derive(Debug, Clone, Copy)]
pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub range: &'a ShardingRange,
}

/// Values of several sharding columns from one AND-group.
#[derive(Debug, Clone)]
pub struct ComplexKeysShardingValue<'a> {
    pub logic_table: &'a str,
    /// Column name (lowercase) → values.
    pub columns: BTreeMap<String, ColumnShardingValues>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnShardingValues {
    List(Vec<Datum>),
    Range(ShardingRange),
}

/// Values supplied out of band through a hint.
#[derive(Debug, Clone, Copy)]
pub struct HintShardingValue<'a> {
    pub logic_table: &'a str,
    pub values: &'a [Datum],
}

/// Single-column algorithm used by standard strategies.
pub trait StandardShardingAlgorithm: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn do_precise(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>>;

    /// Whether `do_range` can narrow a range; when false the route fails
    /// rather than silently scanning everything.
    fn supports_range(&self) -> bool {
        false
    }

    fn do_range(
        &self,
        _available_targets: &[String],
        _value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        Err(ConfigError::RangeNotSupported(self.type_name().to_string()).into())
    }
}

pub trait ComplexKeysShardingAlgorithm: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &ComplexKeysShardingValue<'_>,
    ) -> KestrelResult<Vec<String>>;
}

pub trait HintShardingAlgorithm: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &HintShardingValue<'_>,
    ) -> KestrelResult<Vec<String>>;
}

/// A possibly half-open interval of datums.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingRange {
    pub lower: Bound<Datum>,
    pub upper: Bound<Datum>,
}

impl ShardingRange {
    pub fn new(lower: Bound<Datum>, upper: Bound<Datum>) -> Self {
        Self { lower, upper }
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// `[lower, upper]`, as produced by `BETWEEN`.
    pub fn closed(lower: Datum, upper: Datum) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn contains(&self, value: &Datum) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => compare_datum(value, l) != Ordering::Less,
            Bound::Excluded(l) => compare_datum(value, l) == Ordering::Greater,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => compare_datum(value, u) != Ordering::Greater,
            Bound::Excluded(u) => compare_datum(value, u) == Ordering::Less,
        };
        above && below
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => compare_datum(l, u) == Ordering::Greater,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => compare_datum(l, u) != Ordering::Less,
            _ => false,
        }
    }

    /// The overlap of two ranges, `None` when they are disjoint.
    pub fn intersect(&self, other: &ShardingRange) -> Option<ShardingRange> {
        let lower = tighter(&self.lower, &other.lower, Ordering::Greater);
        let upper = tighter(&self.upper, &other.upper, Ordering::Less);
        let range = ShardingRange::new(lower, upper);
        (!range.is_empty()).then_some(range)
    }

    /// Inclusive integer bounds, `None` for an unbounded side. Fails when a
    /// bound is not integral.
    pub fn integer_bounds(&self, algorithm: &str) -> KestrelResult<(Option<i128>, Option<i128>)> {
        let lower = match &self.lower {
            Bound::Unbounded => None,
            Bound::Included(d) => Some(sharding_int(algorithm, d)?),
            Bound::Excluded(d) => Some(sharding_int(algorithm, d)?.saturating_add(1)),
        };
        let upper = match &self.upper {
            Bound::Unbounded => None,
            Bound::Included(d) => Some(sharding_int(algorithm, d)?),
            Bound::Excluded(d) => Some(sharding_int(algorithm, d)?.saturating_sub(1)),
        };
        Ok((lower, upper))
    }
}

/// Pick the more restrictive of two bounds on the same side. `prefer` is the
/// ordering of the winning value (`Greater` for lower bounds).
fn tighter(a: &Bound<Datum>, b: &Bound<Datum>, prefer: Ordering) -> Bound<Datum> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match compare_datum(x, y) {
                Ordering::Equal => {
                    if matches!(a, Bound::Excluded(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
                ord if ord == prefer => a.clone(),
                _ => b.clone(),
            }
        }
    }
}

impl fmt::Display for ShardingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Unbounded => write!(f, "(-inf")?,
            Bound::Included(d) => write!(f, "[{d}")?,
            Bound::Excluded(d) => write!(f, "({d}")?,
        }
        match &self.upper {
            Bound::Unbounded => write!(f, ", +inf)"),
            Bound::Included(d) => write!(f, ", {d}]"),
            Bound::Excluded(d) => write!(f, ", {d})"),
        }
    }
}

pub(crate) fn sharding_int(algorithm: &str, value: &Datum) -> KestrelResult<i128> {
    value.as_sharding_int().ok_or_else(|| {
        RouteError::InvalidCondition(format!(
            "{algorithm} requires an integer sharding value, got {} '{value}'",
            value.kind_name()
        ))
        .into()
    })
}

/// Numeric suffix of a target name: `t_order_12` → 12, `ds1` → 1.
pub(crate) fn trailing_index(target: &str) -> Option<u64> {
    let digits = target
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    target[target.len() - digits..].parse().ok()
}

/// Targets whose numeric suffix equals `index`. Empty when the index lives
/// on another data source's targets.
pub(crate) fn targets_with_index(available_targets: &[String], index: u64) -> Vec<String> {
    available_targets
        .iter()
        .filter(|t| trailing_index(t) == Some(index))
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_range(lower: Bound<i64>, upper: Bound<i64>) -> ShardingRange {
        let map = |b: Bound<i64>| match b {
            Bound::Included(v) => Bound::Included(Datum::Int64(v)),
            Bound::Excluded(v) => Bound::Excluded(Datum::Int64(v)),
            Bound::Unbounded => Bound::Unbounded,
        };
        ShardingRange::new(map(lower), map(upper))
    }

    #[test]
    fn test_trailing_index() {
        assert_eq!(trailing_index("t_order_12"), Some(12));
        assert_eq!(trailing_index("ds1"), Some(1));
        assert_eq!(trailing_index("t_order"), None);
        assert_eq!(
            targets_with_index(&targets(&["t_1", "t_11", "t_21"]), 1),
            vec!["t_1"]
        );
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = int_range(Bound::Included(1), Bound::Excluded(10));
        let b = int_range(Bound::Excluded(5), Bound::Unbounded);
        let r = a.intersect(&b).unwrap();
        assert_eq!(r, int_range(Bound::Excluded(5), Bound::Excluded(10)));
        assert!(r.contains(&Datum::Int64(6)));
        assert!(!r.contains(&Datum::Int64(5)));
        assert!(!r.contains(&Datum::Int64(10)));
    }

    #[test]
    fn test_intersect_disjoint_and_touching() {
        let a = int_range(Bound::Unbounded, Bound::Excluded(5));
        let b = int_range(Bound::Included(5), Bound::Unbounded);
        assert!(a.intersect(&b).is_none());

        let c = int_range(Bound::Unbounded, Bound::Included(5));
        let point = c.intersect(&b).unwrap();
        assert!(point.contains(&Datum::Int64(5)));
        assert_eq!(point.integer_bounds("T").unwrap(), (Some(5), Some(5)));
    }

    #[test]
    fn test_integer_bounds_rejects_text() {
        let r = ShardingRange::closed(Datum::Text("a".into()), Datum::Text("b".into()));
        assert!(r.integer_bounds("MOD").unwrap_err().is_user_error());
    }

    #[test]
    fn test_display() {
        let r = int_range(Bound::Included(1), Bound::Unbounded);
        assert_eq!(r.to_string(), "[1, +inf)");
    }
}
