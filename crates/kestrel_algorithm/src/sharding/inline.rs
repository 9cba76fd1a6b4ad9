//! Expression-driven algorithms: `INLINE`, `COMPLEX_INLINE`, `HINT_INLINE`.
//!
//! Each renders an `algorithm-expression` template such as
//! `t_order_${order_id % 4}` with the sharding values bound to its variables.
//! The rendered name must be one of the available targets.

use std::collections::BTreeMap;

use kestrel_common::datum::Datum;
use kestrel_common::error::{ConfigError, KestrelResult};
use kestrel_common::inline::InlineTemplate;
use kestrel_common::props::Props;

use super::{
    ColumnShardingValues, ComplexKeysShardingAlgorithm, ComplexKeysShardingValue,
    HintShardingAlgorithm, HintShardingValue, PreciseShardingValue, RangeShardingValue,
    StandardShardingAlgorithm,
};

const EXPRESSION: &str = "algorithm-expression";
const ALLOW_RANGE: &str = "allow-range-query-with-inline-sharding";

pub struct InlineShardingAlgorithm {
    template: InlineTemplate,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub const TYPE: &'static str = "INLINE";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let expression = props.require_str(Self::TYPE, EXPRESSION)?;
        Ok(Self {
            template: InlineTemplate::parse(&expression)?,
            allow_range_query: props.get_bool(Self::TYPE, ALLOW_RANGE, false)?,
        })
    }
}

impl StandardShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_precise(
        &self,
        _available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let rendered = self.template.render(|name| {
            name.eq_ignore_ascii_case(value.column)
                .then(|| value.value.clone())
        })?;
        Ok(vec![rendered])
    }

    fn supports_range(&self) -> bool {
        self.allow_range_query
    }

    /// An expression cannot be inverted over a range; when allowed, a range
    /// routes to every target.
    fn do_range(
        &self,
        available_targets: &[String],
        _value: &RangeShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        if !self.allow_range_query {
            return Err(ConfigError::RangeNotSupported(Self::TYPE.to_string()).into());
        }
        Ok(available_targets.to_vec())
    }
}

pub struct ComplexInlineShardingAlgorithm {
    template: InlineTemplate,
    allow_range_query: bool,
}

impl ComplexInlineShardingAlgorithm {
    pub const TYPE: &'static str = "COMPLEX_INLINE";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let expression = props.require_str(Self::TYPE, EXPRESSION)?;
        Ok(Self {
            template: InlineTemplate::parse(&expression)?,
            allow_range_query: props.get_bool(Self::TYPE, ALLOW_RANGE, false)?,
        })
    }
}

impl ComplexKeysShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &ComplexKeysShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let mut lists: Vec<(String, &[Datum])> = Vec::new();
        for name in self.template.variables() {
            match value.columns.get(&name.to_ascii_lowercase()) {
                Some(ColumnShardingValues::List(values)) => lists.push((name, values.as_slice())),
                Some(ColumnShardingValues::Range(_)) => {
                    if !self.allow_range_query {
                        return Err(ConfigError::RangeNotSupported(Self::TYPE.to_string()).into());
                    }
                    return Ok(available_targets.to_vec());
                }
                None => {
                    tracing::debug!(
                        table = value.logic_table,
                        column = %name,
                        "complex inline expression variable unbound, routing to all targets"
                    );
                    return Ok(available_targets.to_vec());
                }
            }
        }

        let mut result: Vec<String> = Vec::new();
        for combination in cartesian(&lists) {
            let rendered = self.template.render(|name| combination.get(name).cloned())?;
            if !result.contains(&rendered) {
                result.push(rendered);
            }
        }
        Ok(result)
    }
}

/// Every assignment of one value per variable.
fn cartesian(lists: &[(String, &[Datum])]) -> Vec<BTreeMap<String, Datum>> {
    let mut out = vec![BTreeMap::new()];
    for (name, values) in lists {
        let mut next = Vec::with_capacity(out.len() * values.len());
        for partial in &out {
            for v in values.iter() {
                let mut extended = partial.clone();
                extended.insert(name.clone(), v.clone());
                next.push(extended);
            }
        }
        out = next;
    }
    out
}

pub struct HintInlineShardingAlgorithm {
    template: InlineTemplate,
}

impl HintInlineShardingAlgorithm {
    pub const TYPE: &'static str = "HINT_INLINE";
    const DEFAULT_EXPRESSION: &'static str = "${value}";

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let expression = props
            .get_str(EXPRESSION)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_EXPRESSION.to_string());
        Ok(Self {
            template: InlineTemplate::parse(&expression)?,
        })
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        _available_targets: &[String],
        value: &HintShardingValue<'_>,
    ) -> KestrelResult<Vec<String>> {
        let mut result = Vec::new();
        for v in value.values {
            let rendered = self.template.render(|name| (name == "value").then(|| v.clone()))?;
            if !result.contains(&rendered) {
                result.push(rendered);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::{targets, ShardingRange};

    #[test]
    fn test_inline_precise() {
        let alg = InlineShardingAlgorithm::new(
            &Props::new().with(EXPRESSION, "ds_${order_id % 4 / 2}"),
        )
        .unwrap();
        let v = Datum::Int64(13);
        let out = alg
            .do_precise(
                &targets(&["ds_0", "ds_1"]),
                &PreciseShardingValue {
                    logic_table: "t_order",
                    column: "ORDER_ID",
                    value: &v,
                },
            )
            .unwrap();
        assert_eq!(out, vec!["ds_0"]);
    }

    #[test]
    fn test_inline_range_requires_opt_in() {
        let range = ShardingRange::closed(Datum::Int64(1), Datum::Int64(3));
        let value = RangeShardingValue {
            logic_table: "t",
            column: "id",
            range: &range,
        };
        let tables = targets(&["t_0", "t_1"]);

        let strict = InlineShardingAlgorithm::new(&Props::new().with(EXPRESSION, "t_${id % 2}")).unwrap();
        assert!(!strict.supports_range());
        assert!(strict.do_range(&tables, &value).unwrap_err().is_configuration());

        let lenient = InlineShardingAlgorithm::new(
            &Props::new()
                .with(EXPRESSION, "t_${id % 2}")
                .with(ALLOW_RANGE, true),
        )
        .unwrap();
        assert!(lenient.supports_range());
        assert_eq!(lenient.do_range(&tables, &value).unwrap(), tables);
    }

    #[test]
    fn test_complex_inline_cartesian() {
        let alg = ComplexInlineShardingAlgorithm::new(
            &Props::new().with(EXPRESSION, "t_${(user_id + order_id) % 4}"),
        )
        .unwrap();
        let mut columns = BTreeMap::new();
        columns.insert(
            "user_id".to_string(),
            ColumnShardingValues::List(vec![Datum::Int64(1), Datum::Int64(2)]),
        );
        columns.insert(
            "order_id".to_string(),
            ColumnShardingValues::List(vec![Datum::Int64(10)]),
        );
        let value = ComplexKeysShardingValue {
            logic_table: "t",
            columns,
        };
        let out = alg
            .do_sharding(&targets(&["t_0", "t_1", "t_2", "t_3"]), &value)
            .unwrap();
        assert_eq!(out, vec!["t_3", "t_0"]);
    }

    #[test]
    fn test_complex_inline_missing_column_routes_everywhere() {
        let alg = ComplexInlineShardingAlgorithm::new(
            &Props::new().with(EXPRESSION, "t_${(a + b) % 2}"),
        )
        .unwrap();
        let mut columns = BTreeMap::new();
        columns.insert("a".to_string(), ColumnShardingValues::List(vec![Datum::Int64(1)]));
        let value = ComplexKeysShardingValue {
            logic_table: "t",
            columns,
        };
        let tables = targets(&["t_0", "t_1"]);
        assert_eq!(alg.do_sharding(&tables, &value).unwrap(), tables);
    }

    #[test]
    fn test_hint_inline_default_expression() {
        let alg = HintInlineShardingAlgorithm::new(&Props::new()).unwrap();
        let values = [Datum::Text("ds_1".into()), Datum::Text("ds_1".into())];
        let out = alg
            .do_sharding(
                &targets(&["ds_0", "ds_1"]),
                &HintShardingValue {
                    logic_table: "t",
                    values: &values,
                },
            )
            .unwrap();
        assert_eq!(out, vec!["ds_1"]);
    }

    #[test]
    fn test_hint_inline_modulo() {
        let alg =
            HintInlineShardingAlgorithm::new(&Props::new().with(EXPRESSION, "ds_${value % 2}"))
                .unwrap();
        let values = [Datum::Int64(7)];
        let out = alg
            .do_sharding(
                &targets(&["ds_0", "ds_1"]),
                &HintShardingValue {
                    logic_table: "t",
                    values: &values,
                },
            )
            .unwrap();
        assert_eq!(out, vec!["ds_1"]);
    }

    #[test]
    fn test_expression_required() {
        assert!(InlineShardingAlgorithm::new(&Props::new()).is_err());
    }
}
