//! Algorithm registry: type name → factory.
//!
//! Built once at startup and passed by reference to rule construction, so
//! custom algorithms are added with `register_*` without touching the rule
//! builder.
//!
//! # Usage
//! ```ignore
//! let mut registry = AlgorithmRegistry::with_builtins();
//! registry.register_standard(
//!     "MY_ALG",
//!     Box::new(|props: &Props| -> Result<Arc<dyn StandardShardingAlgorithm>, ConfigError> {
//!         Ok(Arc::new(MyAlg::new(props)?))
//!     }),
//! );
//! let rule = ShardingRule::new(&config, &registry)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use kestrel_common::config::AlgorithmConfig;
use kestrel_common::error::ConfigError;
use kestrel_common::props::Props;

use crate::keygen::{KeyGenerateAlgorithm, SnowflakeKeyGenerator};
use crate::loadbalance::{LoadBalanceAlgorithm, RoundRobinLoadBalancer, WeightLoadBalancer};
use crate::sharding::{
    BoundaryRangeShardingAlgorithm, ComplexInlineShardingAlgorithm, ComplexKeysShardingAlgorithm,
    HashModShardingAlgorithm, HintInlineShardingAlgorithm, HintShardingAlgorithm,
    InlineShardingAlgorithm, ModShardingAlgorithm, StandardShardingAlgorithm,
    VolumeRangeShardingAlgorithm,
};

macro_rules! factory {
    ($alg:ty => $kind:ty) => {
        Box::new(|props: &Props| -> Result<Arc<$kind>, ConfigError> {
            Ok(Arc::new(<$alg>::new(props)?))
        })
    };
}

pub type Factory<T> = Box<dyn Fn(&Props) -> Result<Arc<T>, ConfigError> + Send + Sync>;

pub type StandardFactory = Factory<dyn StandardShardingAlgorithm>;
pub type ComplexFactory = Factory<dyn ComplexKeysShardingAlgorithm>;
pub type HintFactory = Factory<dyn HintShardingAlgorithm>;
pub type LoadBalanceFactory = Factory<dyn LoadBalanceAlgorithm>;
pub type KeyGenerateFactory = Factory<dyn KeyGenerateAlgorithm>;

/// Registry of algorithm factories, keyed by upper-case type name.
#[derive(Default)]
pub struct AlgorithmRegistry {
    standard: HashMap<String, StandardFactory>,
    complex: HashMap<String, ComplexFactory>,
    hint: HashMap<String, HintFactory>,
    load_balance: HashMap<String, LoadBalanceFactory>,
    key_generate: HashMap<String, KeyGenerateFactory>,
}

impl AlgorithmRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in algorithm.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register_standard(
            ModShardingAlgorithm::TYPE,
            factory!(ModShardingAlgorithm => dyn StandardShardingAlgorithm),
        );
        reg.register_standard(
            HashModShardingAlgorithm::TYPE,
            factory!(HashModShardingAlgorithm => dyn StandardShardingAlgorithm),
        );
        reg.register_standard(
            InlineShardingAlgorithm::TYPE,
            factory!(InlineShardingAlgorithm => dyn StandardShardingAlgorithm),
        );
        reg.register_standard(
            BoundaryRangeShardingAlgorithm::TYPE,
            factory!(BoundaryRangeShardingAlgorithm => dyn StandardShardingAlgorithm),
        );
        reg.register_standard(
            VolumeRangeShardingAlgorithm::TYPE,
            factory!(VolumeRangeShardingAlgorithm => dyn StandardShardingAlgorithm),
        );
        reg.register_complex(
            ComplexInlineShardingAlgorithm::TYPE,
            factory!(ComplexInlineShardingAlgorithm => dyn ComplexKeysShardingAlgorithm),
        );
        reg.register_hint(
            HintInlineShardingAlgorithm::TYPE,
            factory!(HintInlineShardingAlgorithm => dyn HintShardingAlgorithm),
        );
        reg.register_load_balance(
            RoundRobinLoadBalancer::TYPE,
            factory!(RoundRobinLoadBalancer => dyn LoadBalanceAlgorithm),
        );
        reg.register_load_balance(
            WeightLoadBalancer::TYPE,
            factory!(WeightLoadBalancer => dyn LoadBalanceAlgorithm),
        );
        reg.register_key_generate(
            SnowflakeKeyGenerator::TYPE,
            factory!(SnowflakeKeyGenerator => dyn KeyGenerateAlgorithm),
        );
        reg
    }

    pub fn register_standard(&mut self, type_name: &str, factory: StandardFactory) {
        self.standard.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn register_complex(&mut self, type_name: &str, factory: ComplexFactory) {
        self.complex.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn register_hint(&mut self, type_name: &str, factory: HintFactory) {
        self.hint.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn register_load_balance(&mut self, type_name: &str, factory: LoadBalanceFactory) {
        self.load_balance
            .insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn register_key_generate(&mut self, type_name: &str, factory: KeyGenerateFactory) {
        self.key_generate
            .insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn create_standard(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn StandardShardingAlgorithm>, ConfigError> {
        create(&self.standard, "standard sharding", config)
    }

    pub fn create_complex(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn ComplexKeysShardingAlgorithm>, ConfigError> {
        create(&self.complex, "complex sharding", config)
    }

    pub fn create_hint(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn HintShardingAlgorithm>, ConfigError> {
        create(&self.hint, "hint sharding", config)
    }

    pub fn create_load_balance(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn LoadBalanceAlgorithm>, ConfigError> {
        create(&self.load_balance, "load balance", config)
    }

    pub fn create_key_generate(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn KeyGenerateAlgorithm>, ConfigError> {
        create(&self.key_generate, "key generate", config)
    }

    /// Registered type names of one kind, sorted. Used by the CLI.
    pub fn list_types(&self) -> Vec<(&'static str, Vec<&str>)> {
        fn sorted<T: ?Sized>(map: &HashMap<String, Factory<T>>) -> Vec<&str> {
            let mut names: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            names.sort();
            names
        }
        vec![
            ("standard sharding", sorted(&self.standard)),
            ("complex sharding", sorted(&self.complex)),
            ("hint sharding", sorted(&self.hint)),
            ("load balance", sorted(&self.load_balance)),
            ("key generate", sorted(&self.key_generate)),
        ]
    }
}

fn create<T: ?Sized>(
    factories: &HashMap<String, Factory<T>>,
    kind: &'static str,
    config: &AlgorithmConfig,
) -> Result<Arc<T>, ConfigError> {
    let factory = factories
        .get(&config.type_name.to_ascii_uppercase())
        .ok_or_else(|| ConfigError::AlgorithmTypeNotFound {
            kind,
            type_name: config.type_name.clone(),
        })?;
    factory(&config.props)
}
