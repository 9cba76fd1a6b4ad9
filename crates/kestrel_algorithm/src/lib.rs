//! Pluggable algorithms: sharding, read replica load balancing, key generation.
//!
//! Every algorithm is immutable once built from its properties and shared
//! through `Arc`. Implementations are created by type name through an
//! explicit [`AlgorithmRegistry`] handed to rule construction.

pub mod keygen;
pub mod loadbalance;
pub mod registry;
pub mod sharding;

pub use keygen::{KeyGenerateAlgorithm, SnowflakeKeyGenerator};
pub use loadbalance::{LoadBalanceAlgorithm, RoundRobinLoadBalancer, WeightLoadBalancer};
pub use registry::AlgorithmRegistry;
pub use sharding::{
    ColumnShardingValues, ComplexKeysShardingAlgorithm, ComplexKeysShardingValue,
    HintShardingAlgorithm, HintShardingValue, PreciseShardingValue, RangeShardingValue,
    ShardingRange, StandardShardingAlgorithm,
};
