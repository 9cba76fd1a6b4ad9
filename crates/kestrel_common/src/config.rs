use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::props::Props;
use crate::types::Dialect;

/// Top-level rule configuration (`kestrel.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KestrelConfig {
    #[serde(default)]
    pub props: KernelProps,
    /// Physical data sources. Connection details belong to the execution
    /// layer; only the names matter for routing.
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
    #[serde(default)]
    pub sharding: ShardingRuleConfig,
    #[serde(default)]
    pub readwrite_splitting: ReadwriteSplittingRuleConfig,
}

/// Kernel-wide switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelProps {
    /// Log the logical SQL and every rewritten SQL at INFO (default: false).
    #[serde(default)]
    pub sql_show: bool,
    /// Upper bound on rows buffered by memory merges (default: 1,000,000).
    #[serde(default = "default_max_rows_buffered")]
    pub max_rows_buffered: usize,
    /// Dialect assumed when a statement does not carry one.
    #[serde(default)]
    pub dialect: Dialect,
}

fn default_max_rows_buffered() -> usize {
    1_000_000
}

impl Default for KernelProps {
    fn default() -> Self {
        Self {
            sql_show: false,
            max_rows_buffered: default_max_rows_buffered(),
            dialect: Dialect::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    /// Informational connection string, passed through to the execution layer.
    #[serde(default)]
    pub url: String,
}

impl DataSourceConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: String::new(),
        }
    }
}

/// A named algorithm: `type` selects the implementation from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub props: Props,
}

impl AlgorithmConfig {
    pub fn new(type_name: &str, props: Props) -> Self {
        Self {
            type_name: type_name.to_string(),
            props,
        }
    }
}

/// How a complex (multi-column) strategy treats an AND-group that constrains
/// only some of its sharding columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinePolicy {
    /// Every sharding column must be constrained; otherwise route to all targets.
    #[default]
    RequireAllColumns,
    /// Call the algorithm with whichever columns are constrained.
    AnyColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    Complex {
        sharding_columns: Vec<String>,
        algorithm: String,
        #[serde(default)]
        combine_policy: CombinePolicy,
    },
    Hint {
        algorithm: String,
    },
    None,
}

impl StrategyConfig {
    pub fn standard(column: &str, algorithm: &str) -> Self {
        StrategyConfig::Standard {
            sharding_column: column.to_string(),
            algorithm: algorithm.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    pub generator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    /// Inline expression, e.g. `ds_${0..1}.t_order_${0..1}`.
    pub actual_data_nodes: String,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

impl TableRuleConfig {
    pub fn new(actual_data_nodes: &str) -> Self {
        Self {
            actual_data_nodes: actual_data_nodes.to_string(),
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, TableRuleConfig>,
    /// Groups of tables sharing one sharding layout.
    #[serde(default)]
    pub binding_tables: Vec<Vec<String>>,
    /// Tables replicated on every data source.
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    /// Non-sharded tables living on the default data source.
    #[serde(default)]
    pub single_tables: Vec<String>,
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub algorithms: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadwriteSplittingRuleConfig {
    /// Logical data source name → its write/read members.
    #[serde(default)]
    pub groups: BTreeMap<String, ReadwriteGroupConfig>,
    #[serde(default)]
    pub load_balancers: BTreeMap<String, AlgorithmConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadwriteGroupConfig {
    pub write_data_source: String,
    #[serde(default)]
    pub read_data_sources: Vec<String>,
    /// Name of an entry in `load_balancers`; round-robin when absent.
    #[serde(default)]
    pub load_balancer: Option<String>,
}

impl KestrelConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: KestrelConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate_topology()?;
        Ok(config)
    }

    /// Read and parse a rule file. Unlike server settings there is no
    /// fallback: a missing or malformed rule file is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded rule config from {} ({} data sources, {} sharding tables)",
            path.display(),
            config.data_sources.len(),
            config.sharding.tables.len()
        );
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Names routing sees: read-write groups stand in for their members,
    /// data sources outside any group stand for themselves.
    pub fn logical_data_source_names(&self) -> Vec<String> {
        let members: BTreeSet<&str> = self
            .readwrite_splitting
            .groups
            .values()
            .flat_map(|g| {
                std::iter::once(g.write_data_source.as_str())
                    .chain(g.read_data_sources.iter().map(String::as_str))
            })
            .collect();
        let mut names: Vec<String> = self
            .data_sources
            .iter()
            .filter(|ds| !members.contains(ds.name.as_str()))
            .map(|ds| ds.name.clone())
            .collect();
        names.extend(self.readwrite_splitting.groups.keys().cloned());
        names.sort();
        names
    }

    /// Structural checks that need no algorithm registry.
    pub fn validate_topology(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for ds in &self.data_sources {
            if ds.name.trim().is_empty() {
                return Err(ConfigError::Invalid("data source with empty name".into()));
            }
            if !seen.insert(ds.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "data source",
                    name: ds.name.clone(),
                });
            }
        }
        for (group, cfg) in &self.readwrite_splitting.groups {
            if seen.contains(group.as_str()) {
                return Err(ConfigError::InvalidReadwriteGroup {
                    group: group.clone(),
                    reason: "group name collides with a data source name".into(),
                });
            }
            for member in std::iter::once(&cfg.write_data_source).chain(&cfg.read_data_sources) {
                if !seen.contains(member.as_str()) {
                    return Err(ConfigError::InvalidReadwriteGroup {
                        group: group.clone(),
                        reason: format!("member '{member}' is not a declared data source"),
                    });
                }
            }
            if let Some(lb) = &cfg.load_balancer {
                if !self.readwrite_splitting.load_balancers.contains_key(lb) {
                    return Err(ConfigError::AlgorithmNotDefined(lb.clone()));
                }
            }
        }
        Ok(())
    }

    /// A representative configuration: `t_order` and `t_order_item` bound and
    /// sharded over two read-write groups, `t_config` broadcast.
    pub fn sample() -> Self {
        let mut config = KestrelConfig::default();
        for name in ["write_ds_0", "read_ds_0", "write_ds_1", "read_ds_1"] {
            config.data_sources.push(DataSourceConfig {
                name: name.to_string(),
                url: format!("mysql://127.0.0.1:3306/{name}"),
            });
        }
        for i in 0..2 {
            config.readwrite_splitting.groups.insert(
                format!("ds_{i}"),
                ReadwriteGroupConfig {
                    write_data_source: format!("write_ds_{i}"),
                    read_data_sources: vec![format!("read_ds_{i}")],
                    load_balancer: Some("round_robin".into()),
                },
            );
        }
        config.readwrite_splitting.load_balancers.insert(
            "round_robin".into(),
            AlgorithmConfig::new("ROUND_ROBIN", Props::new()),
        );

        let sharding = &mut config.sharding;
        sharding.default_database_strategy = Some(StrategyConfig::standard("user_id", "database_inline"));
        sharding.algorithms.insert(
            "database_inline".into(),
            AlgorithmConfig::new(
                "INLINE",
                Props::new().with("algorithm-expression", "ds_${user_id % 2}"),
            ),
        );
        sharding.algorithms.insert(
            "t_order_mod".into(),
            AlgorithmConfig::new("MOD", Props::new().with("sharding-count", 2)),
        );
        sharding.key_generators.insert(
            "snowflake".into(),
            AlgorithmConfig::new("SNOWFLAKE", Props::new().with("worker-id", 1)),
        );
        for table in ["t_order", "t_order_item"] {
            let mut rule = TableRuleConfig::new(&format!("ds_${{0..1}}.{table}_${{0..1}}"));
            rule.table_strategy = Some(StrategyConfig::standard("order_id", "t_order_mod"));
            if table == "t_order" {
                rule.key_generate = Some(KeyGenerateConfig {
                    column: "order_id".into(),
                    generator: "snowflake".into(),
                });
            }
            sharding.tables.insert(table.to_string(), rule);
        }
        sharding.binding_tables = vec![vec!["t_order".into(), "t_order_item".into()]];
        sharding.broadcast_tables = vec!["t_config".into()];
        config
    }
}

/// Shorthand for [`KestrelConfig::load`].
pub fn load_config(path: impl AsRef<Path>) -> Result<KestrelConfig, ConfigError> {
    KestrelConfig::load(path)
}
