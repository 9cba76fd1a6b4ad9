//! Sharding strategies: which columns feed which algorithm.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use kestrel_algorithm::{
    AlgorithmRegistry, ColumnShardingValues, ComplexKeysShardingAlgorithm,
    ComplexKeysShardingValue, HintShardingAlgorithm, HintShardingValue, PreciseShardingValue,
    RangeShardingValue, StandardShardingAlgorithm,
};
use kestrel_common::config::{AlgorithmConfig, CombinePolicy, StrategyConfig};
use kestrel_common::datum::Datum;
use kestrel_common::error::{ConfigError, KestrelResult};

use crate::condition::ShardingCondition;

#[derive(Clone)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    },
    Complex {
        columns: Vec<String>,
        algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
        policy: CombinePolicy,
    },
    Hint {
        algorithm: Arc<dyn HintShardingAlgorithm>,
    },
    None,
}

impl fmt::Debug for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingStrategy::Standard { column, algorithm } => f
                .debug_struct("Standard")
                .field("column", column)
                .field("algorithm", &algorithm.type_name())
                .finish(),
            ShardingStrategy::Complex {
                columns,
                algorithm,
                policy,
            } => f
                .debug_struct("Complex")
                .field("columns", columns)
                .field("algorithm", &algorithm.type_name())
                .field("policy", policy)
                .finish(),
            ShardingStrategy::Hint { algorithm } => f
                .debug_struct("Hint")
                .field("algorithm", &algorithm.type_name())
                .finish(),
            ShardingStrategy::None => f.write_str("None"),
        }
    }
}

/// Inputs for one strategy evaluation.
pub struct ShardingInput<'a> {
    pub logic_table: &'a str,
    /// Tables whose condition values apply: the routed table and its
    /// binding peers in the statement.
    pub value_tables: &'a [&'a str],
    pub condition: &'a ShardingCondition,
    pub hint_values: Option<&'a [Datum]>,
}

impl ShardingStrategy {
    /// Build from configuration, resolving the algorithm by name.
    pub fn build(
        config: &StrategyConfig,
        algorithms: &BTreeMap<String, AlgorithmConfig>,
        registry: &AlgorithmRegistry,
    ) -> Result<Self, ConfigError> {
        let lookup = |name: &str| {
            algorithms
                .get(name)
                .ok_or_else(|| ConfigError::AlgorithmNotDefined(name.to_string()))
        };
        Ok(match config {
            StrategyConfig::Standard {
                sharding_column,
                algorithm,
            } => ShardingStrategy::Standard {
                column: sharding_column.to_ascii_lowercase(),
                algorithm: registry.create_standard(lookup(algorithm.as_str())?)?,
            },
            StrategyConfig::Complex {
                sharding_columns,
                algorithm,
                combine_policy,
            } => {
                if sharding_columns.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "complex strategy with algorithm '{algorithm}' has no sharding columns"
                    )));
                }
                ShardingStrategy::Complex {
                    columns: sharding_columns
                        .iter()
                        .map(|c| c.to_ascii_lowercase())
                        .collect(),
                    algorithm: registry.create_complex(lookup(algorithm.as_str())?)?,
                    policy: *combine_policy,
                }
            }
            StrategyConfig::Hint { algorithm } => ShardingStrategy::Hint {
                algorithm: registry.create_hint(lookup(algorithm.as_str())?)?,
            },
            StrategyConfig::None => ShardingStrategy::None,
        })
    }

    pub fn columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard { column, .. } => vec![column.as_str()],
            ShardingStrategy::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            ShardingStrategy::Hint { .. } | ShardingStrategy::None => Vec::new(),
        }
    }

    /// Narrow `targets` for one condition. The result is a subset of
    /// `targets` in target order; an algorithm naming an unknown target is a
    /// configuration error.
    pub fn do_sharding(&self, targets: &[String], input: &ShardingInput<'_>) -> KestrelResult<Vec<String>> {
        let (routed, algorithm) = match self {
            ShardingStrategy::None => return Ok(targets.to_vec()),
            ShardingStrategy::Standard { column, algorithm } => {
                let routed = match input.condition.find(input.value_tables, column) {
                    None => return Ok(targets.to_vec()),
                    Some(ColumnShardingValues::List(values)) => {
                        let mut routed = Vec::new();
                        for value in values {
                            let mut names = algorithm.do_precise(
                                targets,
                                &PreciseShardingValue {
                                    logic_table: input.logic_table,
                                    column: column.as_str(),
                                    value,
                                },
                            )?;
                            // With several values, some belong to tables on
                            // other data sources.
                            if values.len() > 1 {
                                names.retain(|n| targets.contains(n));
                            }
                            routed.extend(names);
                        }
                        routed
                    }
                    Some(ColumnShardingValues::Range(range)) => {
                        if !algorithm.supports_range() {
                            return Err(ConfigError::RangeNotSupported(
                                algorithm.type_name().to_string(),
                            )
                            .into());
                        }
                        algorithm.do_range(
                            targets,
                            &RangeShardingValue {
                                logic_table: input.logic_table,
                                column: column.as_str(),
                                range,
                            },
                        )?
                    }
                };
                (routed, algorithm.type_name())
            }
            ShardingStrategy::Complex {
                columns,
                algorithm,
                policy,
            } => {
                let mut present = BTreeMap::new();
                for column in columns {
                    if let Some(values) = input.condition.find(input.value_tables, column) {
                        present.insert(column.clone(), values.clone());
                    }
                }
                let partial = present.len() < columns.len();
                if present.is_empty() || (partial && *policy == CombinePolicy::RequireAllColumns) {
                    return Ok(targets.to_vec());
                }
                let routed = algorithm.do_sharding(
                    targets,
                    &ComplexKeysShardingValue {
                        logic_table: input.logic_table,
                        columns: present,
                    },
                )?;
                (routed, algorithm.type_name())
            }
            ShardingStrategy::Hint { algorithm } => match input.hint_values {
                None => return Ok(targets.to_vec()),
                Some(values) => {
                    let routed = algorithm.do_sharding(
                        targets,
                        &HintShardingValue {
                            logic_table: input.logic_table,
                            values,
                        },
                    )?;
                    (routed, algorithm.type_name())
                }
            },
        };
        if let Some(unknown) = routed.iter().find(|r| !targets.contains(r)) {
            return Err(ConfigError::TargetNotFound {
                algorithm: algorithm.to_string(),
                target: unknown.clone(),
            }
            .into());
        }
        Ok(targets
            .iter()
            .filter(|t| routed.contains(t))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use kestrel_algorithm::ShardingRange;
    use kestrel_common::props::Props;

    use super::*;
    use crate::condition::ShardingConditionValue;

    fn algorithms() -> BTreeMap<String, AlgorithmConfig> {
        let mut map = BTreeMap::new();
        map.insert(
            "mod2".to_string(),
            AlgorithmConfig::new("MOD", Props::new().with("sharding-count", 2)),
        );
        map.insert(
            "hash".to_string(),
            AlgorithmConfig::new("HASH_MOD", Props::new().with("sharding-count", 2)),
        );
        map.insert(
            "complex".to_string(),
            AlgorithmConfig::new(
                "COMPLEX_INLINE",
                Props::new().with("algorithm-expression", "t_${(a + b) % 2}"),
            ),
        );
        map.insert(
            "hint".to_string(),
            AlgorithmConfig::new("HINT_INLINE", Props::new().with("algorithm-expression", "t_${value % 2}")),
        );
        map.insert(
            "wrong".to_string(),
            AlgorithmConfig::new("INLINE", Props::new().with("algorithm-expression", "x_${a}")),
        );
        map
    }

    fn build(config: StrategyConfig) -> ShardingStrategy {
        ShardingStrategy::build(&config, &algorithms(), &AlgorithmRegistry::with_builtins()).unwrap()
    }

    fn tables() -> Vec<String> {
        vec!["t_0".to_string(), "t_1".to_string()]
    }

    fn condition(values: Vec<(&str, ColumnShardingValues)>) -> ShardingCondition {
        ShardingCondition {
            values: values
                .into_iter()
                .map(|(column, values)| ShardingConditionValue {
                    table: "t".into(),
                    column: column.into(),
                    values,
                })
                .collect(),
        }
    }

    fn list(values: &[i64]) -> ColumnShardingValues {
        ColumnShardingValues::List(values.iter().map(|v| Datum::Int64(*v)).collect())
    }

    fn run(strategy: &ShardingStrategy, cond: &ShardingCondition, hint: Option<&[Datum]>) -> KestrelResult<Vec<String>> {
        strategy.do_sharding(
            &tables(),
            &ShardingInput {
                logic_table: "t",
                value_tables: &["t"],
                condition: cond,
                hint_values: hint,
            },
        )
    }

    #[test]
    fn test_standard_union_in_target_order() {
        let s = build(StrategyConfig::standard("A", "mod2"));
        assert_eq!(s.columns(), vec!["a"]);
        let out = run(&s, &condition(vec![("a", list(&[3, 2, 5]))]), None).unwrap();
        assert_eq!(out, vec!["t_0", "t_1"]);
        let out = run(&s, &condition(vec![("a", list(&[3, 5]))]), None).unwrap();
        assert_eq!(out, vec!["t_1"]);
    }

    #[test]
    fn test_standard_without_value_routes_all() {
        let s = build(StrategyConfig::standard("a", "mod2"));
        let out = run(&s, &condition(vec![("b", list(&[1]))]), None).unwrap();
        assert_eq!(out, tables());
    }

    #[test]
    fn test_range_on_hash_rejected() {
        let s = build(StrategyConfig::standard("a", "hash"));
        let cond = condition(vec![(
            "a",
            ColumnShardingValues::Range(ShardingRange::closed(Datum::Int64(1), Datum::Int64(3))),
        )]);
        assert!(run(&s, &cond, None).unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let s = build(StrategyConfig::standard("a", "wrong"));
        let err = run(&s, &condition(vec![("a", list(&[1]))]), None).unwrap_err();
        assert!(err.to_string().contains("x_1"));
    }

    #[test]
    fn test_complex_combine_policy() {
        let cond = condition(vec![("a", list(&[1]))]);
        let strict = build(StrategyConfig::Complex {
            sharding_columns: vec!["a".into(), "b".into()],
            algorithm: "complex".into(),
            combine_policy: CombinePolicy::RequireAllColumns,
        });
        assert_eq!(run(&strict, &cond, None).unwrap(), tables());

        let full = condition(vec![("a", list(&[1])), ("b", list(&[2]))]);
        assert_eq!(run(&strict, &full, None).unwrap(), vec!["t_1"]);

        let lenient = build(StrategyConfig::Complex {
            sharding_columns: vec!["a".into(), "b".into()],
            algorithm: "complex".into(),
            combine_policy: CombinePolicy::AnyColumn,
        });
        // The expression needs both variables, so the algorithm falls back.
        assert_eq!(run(&lenient, &cond, None).unwrap(), tables());
    }

    #[test]
    fn test_hint_strategy() {
        let s = build(StrategyConfig::Hint {
            algorithm: "hint".into(),
        });
        let cond = ShardingCondition::default();
        assert_eq!(run(&s, &cond, None).unwrap(), tables());
        assert_eq!(run(&s, &cond, Some(&[Datum::Int64(3)][..])).unwrap(), vec!["t_1"]);
    }

    #[test]
    fn test_undefined_algorithm() {
        let err = ShardingStrategy::build(
            &StrategyConfig::standard("a", "missing"),
            &algorithms(),
            &AlgorithmRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::AlgorithmNotDefined(_)));
    }
}
