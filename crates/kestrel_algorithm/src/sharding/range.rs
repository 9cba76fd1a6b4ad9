//! Partition-by-range algorithms.
//!
//! Both split the integer line at ascending boundaries `b0 < b1 < ... < bn`:
//! partition 0 is `(-inf, b0)`, partition `i` is `[b(i-1), bi)` and the last
//! partition is `[bn, +inf)`. A target serves partition `i` when its numeric
//! suffix is `i`.

use kestrel_common::error::{ConfigError, KestrelResult};
use kestrel_common::props::Props;

use super::{
    sharding_int, targets_with_index, trailing_index, PreciseShardingValue, RangeShardingValue,
    StandardShardingAlgorithm,
};

#[derive(Debug, Clone, PartialEq)]
struct Partitions {
    boundaries: Vec<i128>,
}

impl Partitions {
    fn new(algorithm: &str, key: &str, boundaries: Vec<i128>) -> Result<Self, ConfigError> {
        if boundaries.is_empty() {
            return Err(invalid(algorithm, key, "at least one boundary is required"));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(algorithm, key, "boundaries must be strictly ascending"));
        }
        Ok(Self { boundaries })
    }

    fn partition_of(&self, value: i128) -> u64 {
        self.boundaries.partition_point(|b| *b <= value) as u64
    }

    fn precise(
        &self,
        algorithm: &str,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let v = sharding_int(algorithm, value.value)?;
        Ok(targets_with_index(available_targets, self.partition_of(v)))
    }

    fn range(
        &self,
        algorithm: &str,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let (lower, upper) = value.range.integer_bounds(algorithm)?;
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Ok(Vec::new());
            }
        }
        let first = lower.map_or(0, |lo| self.partition_of(lo));
        let last = upper.map_or(self.boundaries.len() as u64, |hi| self.partition_of(hi));
        Ok(available_targets
            .iter()
            .filter(|t| trailing_index(t).is_some_and(|i| (first..=last).contains(&i)))
            .cloned()
            .collect())
    }
}

fn invalid(algorithm: &str, key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidProperty {
        algorithm: algorithm.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// `BOUNDARY_RANGE`: explicit `sharding-ranges` boundaries, e.g. `"10, 20, 30"`.
pub struct BoundaryRangeShardingAlgorithm {
    partitions: Partitions,
}

impl BoundaryRangeShardingAlgorithm {
    pub const TYPE: &'static str = "BOUNDARY_RANGE";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let key = "sharding-ranges";
        let boundaries = props
            .get_list(Self::TYPE, key)?
            .iter()
            .map(|s| {
                s.parse::<i128>()
                    .map_err(|_| invalid(Self::TYPE, key, &format!("'{s}' is not an integer")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            partitions: Partitions::new(Self::TYPE, key, boundaries)?,
        })
    }
}

impl StandardShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_precise(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        self.partitions.precise(Self::TYPE, available_targets, value)
    }

    fn supports_range(&self) -> bool {
        true
    }

    fn do_range(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        self.partitions.range(Self::TYPE, available_targets, value)
    }
}

/// `VOLUME_RANGE`: equal-width partitions of `sharding-volume` between
/// `range-lower` and `range-upper`.
pub struct VolumeRangeShardingAlgorithm {
    partitions: Partitions,
}

impl VolumeRangeShardingAlgorithm {
    pub const TYPE: &'static str = "VOLUME_RANGE";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let lower = props.require_i64(Self::TYPE, "range-lower")? as i128;
        let upper = props.require_i64(Self::TYPE, "range-upper")? as i128;
        let volume = props.require_positive(Self::TYPE, "sharding-volume")? as i128;
        if upper <= lower {
            return Err(invalid(
                Self::TYPE,
                "range-upper",
                "must be greater than range-lower",
            ));
        }
        let mut boundaries = Vec::new();
        let mut b = lower;
        while b < upper {
            boundaries.push(b);
            b += volume;
        }
        boundaries.push(upper);
        Ok(Self {
            partitions: Partitions::new(Self::TYPE, "sharding-volume", boundaries)?,
        })
    }
}

impl StandardShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_precise(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        self.partitions.precise(Self::TYPE, available_targets, value)
    }

    fn supports_range(&self) -> bool {
        true
    }

    fn do_range(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        self.partitions.range(Self::TYPE, available_targets, value)
    }
}
