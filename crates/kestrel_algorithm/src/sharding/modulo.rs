//! `MOD` and `HASH_MOD`: value (or its hash) modulo the shard count, matched
//! against the numeric suffix of each target.

use kestrel_common::datum::Datum;
use kestrel_common::error::{ConfigError, KestrelResult};
use kestrel_common::props::Props;
use xxhash_rust::xxh3::xxh3_64;

use super::{
    sharding_int, targets_with_index, trailing_index, PreciseShardingValue, RangeShardingValue,
    StandardShardingAlgorithm,
};

pub struct ModShardingAlgorithm {
    sharding_count: u64,
}

impl ModShardingAlgorithm {
    pub const TYPE: &'static str = "MOD";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        Ok(Self {
            sharding_count: props.require_positive(Self::TYPE, "sharding-count")?,
        })
    }

    fn index_of(&self, v: i128) -> u64 {
        v.rem_euclid(self.sharding_count as i128) as u64
    }
}

impl StandardShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_precise(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let v = sharding_int(Self::TYPE, value.value)?;
        Ok(targets_with_index(available_targets, self.index_of(v)))
    }

    fn supports_range(&self) -> bool {
        true
    }

    fn do_range(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let (lower, upper) = value.range.integer_bounds(Self::TYPE)?;
        let (lo, hi) = match (lower, upper) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Ok(available_targets.to_vec()),
        };
        if lo > hi {
            return Ok(Vec::new());
        }
        // A span covering every residue hits every target.
        let covers_all = hi
            .checked_sub(lo)
            .map_or(true, |span| span >= self.sharding_count as i128 - 1);
        if covers_all {
            return Ok(available_targets.to_vec());
        }
        let mut indexes: Vec<u64> = (lo..=hi).map(|v| self.index_of(v)).collect();
        indexes.sort_unstable();
        indexes.dedup();
        Ok(available_targets
            .iter()
            .filter(|t| trailing_index(t).is_some_and(|i| indexes.contains(&i)))
            .cloned()
            .collect())
    }
}

pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub const TYPE: &'static str = "HASH_MOD";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        Ok(Self {
            sharding_count: props.require_positive(Self::TYPE, "sharding-count")?,
        })
    }

    /// Hash of the value's canonical text, so `5`, `5::bigint` and `'5'`
    /// land on the same shard.
    fn hash(value: &Datum) -> u64 {
        match value {
            Datum::Bytea(bytes) => xxh3_64(bytes),
            other => xxh3_64(other.to_string().as_bytes()),
        }
    }
}

impl StandardShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_precise(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let index = Self::hash(value.value) % self.sharding_count;
        Ok(targets_with_index(available_targets, index))
    }
}
