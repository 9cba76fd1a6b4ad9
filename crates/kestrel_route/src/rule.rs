//! Sharding rule: logical tables, their data nodes and strategies.
//!
//! Built once from [`KestrelConfig`] and an [`AlgorithmRegistry`], then shared
//! read-only (`Arc<ShardingRule>`). Construction validates everything that
//! can be checked without a statement: inline node expressions, algorithm
//! types and properties, binding group layouts, and that every data node's
//! data source exists in the topology.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kestrel_algorithm::{AlgorithmRegistry, KeyGenerateAlgorithm};
use kestrel_common::config::{KestrelConfig, StrategyConfig};
use kestrel_common::error::ConfigError;
use kestrel_common::inline;
use kestrel_common::types::DataNode;

use crate::strategy::ShardingStrategy;

/// Key generation for one table.
#[derive(Clone)]
pub struct KeyGenerate {
    pub column: String,
    pub algorithm: Arc<dyn KeyGenerateAlgorithm>,
}

impl std::fmt::Debug for KeyGenerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGenerate")
            .field("column", &self.column)
            .field("algorithm", &self.algorithm.type_name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub actual_data_nodes: Vec<DataNode>,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
    pub key_generate: Option<KeyGenerate>,
}

impl TableRule {
    /// Data sources in node order, deduplicated.
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !names.contains(&node.data_source) {
                names.push(node.data_source.clone());
            }
        }
        names
    }

    /// Actual tables on one data source, in node order.
    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// Position of `actual_table` among this table's tables on `data_source`.
    pub fn actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .position(|n| n.table == actual_table)
    }

    /// Database strategy columns followed by table strategy columns.
    pub fn sharding_columns(&self) -> Vec<&str> {
        let mut columns = self.database_strategy.columns();
        for column in self.table_strategy.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.sharding_columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn generate_key_column(&self) -> Option<&str> {
        self.key_generate.as_ref().map(|k| k.column.as_str())
    }
}

#[derive(Debug)]
pub struct ShardingRule {
    tables: BTreeMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: BTreeSet<String>,
    single_tables: BTreeSet<String>,
    data_source_names: Vec<String>,
    default_data_source: String,
}

impl ShardingRule {
    pub fn new(config: &KestrelConfig, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        config.validate_topology()?;
        let sharding = &config.sharding;
        let data_source_names = config.logical_data_source_names();
        if data_source_names.is_empty() {
            return Err(ConfigError::Invalid("no data sources configured".into()));
        }

        let default_data_source = match &sharding.default_data_source {
            Some(ds) if data_source_names.contains(ds) => ds.clone(),
            Some(ds) => {
                return Err(ConfigError::UnknownDataSource {
                    table: "<default>".into(),
                    data_source: ds.clone(),
                })
            }
            None => data_source_names[0].clone(),
        };

        let mut key_generators: BTreeMap<&str, Arc<dyn KeyGenerateAlgorithm>> = BTreeMap::new();
        for (name, algorithm) in &sharding.key_generators {
            key_generators.insert(name.as_str(), registry.create_key_generate(algorithm)?);
        }

        let default_db = build_strategy(
            sharding.default_database_strategy.as_ref(),
            config,
            registry,
        )?;
        let default_table = build_strategy(sharding.default_table_strategy.as_ref(), config, registry)?;

        let mut tables = BTreeMap::new();
        for (name, table_config) in &sharding.tables {
            let logic_table = name.to_ascii_lowercase();
            if tables.contains_key(&logic_table) {
                return Err(ConfigError::Duplicate {
                    kind: "sharding table",
                    name: name.clone(),
                });
            }
            let mut actual_data_nodes = Vec::new();
            for node in inline::expand(&table_config.actual_data_nodes)? {
                let node = DataNode::parse(&node)?;
                if !data_source_names.contains(&node.data_source) {
                    return Err(ConfigError::UnknownDataSource {
                        table: name.clone(),
                        data_source: node.data_source,
                    });
                }
                if actual_data_nodes.contains(&node) {
                    return Err(ConfigError::Duplicate {
                        kind: "data node",
                        name: node.to_string(),
                    });
                }
                actual_data_nodes.push(node);
            }
            let database_strategy = match &table_config.database_strategy {
                Some(cfg) => build_strategy(Some(cfg), config, registry)?,
                None => default_db.clone(),
            };
            let table_strategy = match &table_config.table_strategy {
                Some(cfg) => build_strategy(Some(cfg), config, registry)?,
                None => default_table.clone(),
            };
            let key_generate = match &table_config.key_generate {
                Some(kg) => Some(KeyGenerate {
                    column: kg.column.to_ascii_lowercase(),
                    algorithm: key_generators
                        .get(kg.generator.as_str())
                        .cloned()
                        .ok_or_else(|| ConfigError::AlgorithmNotDefined(kg.generator.clone()))?,
                }),
                None => None,
            };
            tables.insert(
                logic_table.clone(),
                TableRule {
                    logic_table,
                    actual_data_nodes,
                    database_strategy,
                    table_strategy,
                    key_generate,
                },
            );
        }

        let broadcast_tables = lowercase_set(&sharding.broadcast_tables, "broadcast table")?;
        let single_tables = lowercase_set(&sharding.single_tables, "single table")?;
        for name in broadcast_tables.iter().chain(&single_tables) {
            if tables.contains_key(name) {
                return Err(ConfigError::Duplicate {
                    kind: "table rule",
                    name: name.clone(),
                });
            }
        }
        if let Some(name) = broadcast_tables.intersection(&single_tables).next() {
            return Err(ConfigError::Duplicate {
                kind: "table rule",
                name: name.clone(),
            });
        }

        let mut binding_groups = Vec::new();
        let mut bound = BTreeSet::new();
        for group in &sharding.binding_tables {
            let group: Vec<String> = group.iter().map(|t| t.to_ascii_lowercase()).collect();
            validate_binding_group(&group, &tables)?;
            for t in &group {
                if !bound.insert(t.clone()) {
                    return Err(ConfigError::InvalidBindingGroup {
                        tables: group.clone(),
                        reason: format!("'{t}' already belongs to another binding group"),
                    });
                }
            }
            binding_groups.push(group);
        }

        tracing::debug!(
            tables = tables.len(),
            binding_groups = binding_groups.len(),
            broadcast = broadcast_tables.len(),
            data_sources = data_source_names.len(),
            "sharding rule built"
        );
        Ok(Self {
            tables,
            binding_groups,
            broadcast_tables,
            single_tables,
            data_source_names,
            default_data_source,
        })
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .contains(&logic_table.to_ascii_lowercase())
    }

    pub fn is_single_table(&self, logic_table: &str) -> bool {
        self.single_tables.contains(&logic_table.to_ascii_lowercase())
    }

    /// Known to some rule: sharded, broadcast or single.
    pub fn is_known_table(&self, logic_table: &str) -> bool {
        self.is_sharding_table(logic_table)
            || self.is_broadcast_table(logic_table)
            || self.is_single_table(logic_table)
    }

    pub fn is_sharding_column(&self, logic_table: &str, column: &str) -> bool {
        self.table_rule(logic_table)
            .is_some_and(|t| t.is_sharding_column(column))
    }

    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let name = logic_table.to_ascii_lowercase();
        self.binding_groups
            .iter()
            .find(|g| g.contains(&name))
            .map(Vec::as_slice)
    }

    /// All tables belong to one binding group.
    pub fn all_binding(&self, logic_tables: &[String]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        match self.binding_group(first) {
            Some(group) => logic_tables
                .iter()
                .all(|t| group.contains(&t.to_ascii_lowercase())),
            None => false,
        }
    }

    /// Logical data source names routing targets, sorted.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    /// Home of single tables and of statements touching no sharded table.
    pub fn default_data_source(&self) -> &str {
        &self.default_data_source
    }

    /// Actual table of `other` that pairs with `actual_table` of `primary` on
    /// `data_source`: binding tables pair by position.
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        primary: &str,
        actual_table: &str,
        other: &str,
    ) -> Result<String, ConfigError> {
        let primary_rule = self
            .table_rule(primary)
            .ok_or_else(|| ConfigError::UnknownTable(primary.to_string()))?;
        let other_rule = self
            .table_rule(other)
            .ok_or_else(|| ConfigError::UnknownTable(other.to_string()))?;
        primary_rule
            .actual_table_index(data_source, actual_table)
            .and_then(|i| other_rule.actual_tables_in(data_source).get(i).cloned())
            .ok_or_else(|| ConfigError::InvalidBindingGroup {
                tables: vec![primary.to_string(), other.to_string()],
                reason: format!("no table of '{other}' pairs with {data_source}.{actual_table}"),
            })
    }
}

fn build_strategy(
    config: Option<&StrategyConfig>,
    kestrel: &KestrelConfig,
    registry: &AlgorithmRegistry,
) -> Result<ShardingStrategy, ConfigError> {
    match config {
        Some(cfg) => ShardingStrategy::build(cfg, &kestrel.sharding.algorithms, registry),
        None => Ok(ShardingStrategy::None),
    }
}

fn lowercase_set(names: &[String], kind: &'static str) -> Result<BTreeSet<String>, ConfigError> {
    let mut set = BTreeSet::new();
    for name in names {
        if !set.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::Duplicate {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(set)
}

/// Members must be sharded and share one layout: the same data sources with
/// the same number of tables on each.
fn validate_binding_group(
    group: &[String],
    tables: &BTreeMap<String, TableRule>,
) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBindingGroup {
        tables: group.to_vec(),
        reason,
    };
    if group.len() < 2 {
        return Err(invalid("a binding group needs at least two tables".into()));
    }
    let mut layout: Option<(Vec<String>, Vec<usize>)> = None;
    for name in group {
        let rule = tables
            .get(name)
            .ok_or_else(|| invalid(format!("'{name}' is not a sharding table")))?;
        let sources = rule.data_source_names();
        let counts: Vec<usize> = sources.iter().map(|ds| rule.actual_tables_in(ds).len()).collect();
        match &layout {
            None => layout = Some((sources, counts)),
            Some((expected_sources, expected_counts)) => {
                if *expected_sources != sources || *expected_counts != counts {
                    return Err(invalid(format!(
                        "'{name}' does not share the data node layout of '{}'",
                        group[0]
                    )));
                }
            }
        }
    }
    Ok(())
}
