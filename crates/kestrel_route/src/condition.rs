//! Sharding conditions: the sharding-column values a statement constrains.
//!
//! The binder hands over predicates as an OR of AND-groups. Each group that
//! touches a sharding column becomes one [`ShardingCondition`]; predicates on
//! the same column within a group are intersected. A group whose
//! intersection is empty can never match and is dropped. For INSERT, each
//! value row is its own condition.

use std::ops::Bound;

use kestrel_algorithm::{ColumnShardingValues, ShardingRange};
use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelResult, RouteError};
use kestrel_common::statement::{BoundStatement, PredicateOp, RangeBound};

use crate::context::GeneratedKeys;
use crate::rule::ShardingRule;

/// Values of one sharding column of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    /// Lowercase logical table.
    pub table: String,
    /// Lowercase column.
    pub column: String,
    pub values: ColumnShardingValues,
}

/// One AND-group (or one insert row).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    /// Values of `column` from any of `tables`, first match wins.
    pub fn find(&self, tables: &[&str], column: &str) -> Option<&ColumnShardingValues> {
        self.values
            .iter()
            .find(|v| v.column == column && tables.contains(&v.table.as_str()))
            .map(|v| &v.values)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    pub conditions: Vec<ShardingCondition>,
    /// Every group contradicts itself; the statement matches no row.
    pub always_false: bool,
}

impl ShardingConditions {
    /// No usable condition: route to every target.
    pub fn is_unconstrained(&self) -> bool {
        self.conditions.is_empty() && !self.always_false
    }

    /// Extract conditions from the WHERE clause of a SELECT/UPDATE/DELETE.
    pub fn from_statement(
        stmt: &BoundStatement,
        params: &[Datum],
        rule: &ShardingRule,
    ) -> KestrelResult<Self> {
        if stmt.conditions.is_empty() {
            return Ok(Self::default());
        }
        let mut conditions = Vec::new();
        let mut dropped = 0usize;
        for group in &stmt.conditions {
            let mut condition = ShardingCondition::default();
            let mut contradiction = false;
            for predicate in &group.predicates {
                let table = predicate.table.to_ascii_lowercase();
                let column = predicate.column.to_ascii_lowercase();
                if !rule.is_sharding_column(&table, &column) {
                    continue;
                }
                let values = resolve(&predicate.op, params)?;
                match condition
                    .values
                    .iter_mut()
                    .find(|v| v.table == table && v.column == column)
                {
                    Some(existing) => match intersect(&existing.values, &values) {
                        Some(merged) => existing.values = merged,
                        None => contradiction = true,
                    },
                    None => {
                        if is_empty(&values) {
                            contradiction = true;
                        }
                        condition.values.push(ShardingConditionValue {
                            table,
                            column,
                            values,
                        });
                    }
                }
            }
            if contradiction {
                dropped += 1;
                continue;
            }
            if condition.values.is_empty() {
                // One unconstrained OR branch widens the whole statement.
                return Ok(Self::default());
            }
            conditions.push(condition);
        }
        Ok(Self {
            always_false: conditions.is_empty() && dropped > 0,
            conditions,
        })
    }

    /// One condition per insert row from the row's sharding-column values,
    /// generated keys included.
    pub fn from_insert(
        stmt: &BoundStatement,
        params: &[Datum],
        rule: &ShardingRule,
        generated: Option<&GeneratedKeys>,
    ) -> KestrelResult<Self> {
        let Some(insert) = &stmt.insert else {
            return Ok(Self::default());
        };
        let table = insert.table.to_ascii_lowercase();
        let Some(table_rule) = rule.table_rule(&table) else {
            return Ok(Self::default());
        };
        let columns = table_rule.sharding_columns();
        let mut conditions = Vec::with_capacity(insert.rows.len());
        for (row_index, row) in insert.rows.iter().enumerate() {
            let mut condition = ShardingCondition::default();
            for column in &columns {
                let value = match insert.column_index(column) {
                    Some(idx) => row
                        .values
                        .get(idx)
                        .ok_or_else(|| {
                            RouteError::InvalidCondition(format!(
                                "insert row {row_index} has fewer values than columns"
                            ))
                        })?
                        .resolve(params)?,
                    None => match generated.filter(|g| g.column.eq_ignore_ascii_case(column)) {
                        Some(keys) => keys.values.get(row_index).cloned().ok_or_else(|| {
                            RouteError::KeyGeneration(format!("no key generated for row {row_index}"))
                        })?,
                        None => {
                            return Err(RouteError::MissingShardingValue {
                                table: insert.table.clone(),
                                column: column.to_string(),
                            }
                            .into())
                        }
                    },
                };
                condition.values.push(ShardingConditionValue {
                    table: table.clone(),
                    column: column.to_string(),
                    values: ColumnShardingValues::List(vec![value]),
                });
            }
            conditions.push(condition);
        }
        Ok(Self {
            conditions,
            always_false: false,
        })
    }
}

fn resolve(op: &PredicateOp, params: &[Datum]) -> KestrelResult<ColumnShardingValues> {
    Ok(match op {
        PredicateOp::Eq(v) => ColumnShardingValues::List(non_null(vec![v.resolve(params)?])),
        PredicateOp::In(list) => {
            let mut values = Vec::with_capacity(list.len());
            for v in list {
                let d = v.resolve(params)?;
                if !values.contains(&d) {
                    values.push(d);
                }
            }
            ColumnShardingValues::List(non_null(values))
        }
        PredicateOp::Range { lower, upper } => ColumnShardingValues::Range(ShardingRange::new(
            bound(lower.as_ref(), params)?,
            bound(upper.as_ref(), params)?,
        )),
    })
}

/// `col = NULL` never holds.
fn non_null(values: Vec<Datum>) -> Vec<Datum> {
    values.into_iter().filter(|v| !v.is_null()).collect()
}

fn bound(b: Option<&RangeBound>, params: &[Datum]) -> KestrelResult<Bound<Datum>> {
    Ok(match b {
        None => Bound::Unbounded,
        Some(RangeBound { value, inclusive: true }) => Bound::Included(value.resolve(params)?),
        Some(RangeBound { value, inclusive: false }) => Bound::Excluded(value.resolve(params)?),
    })
}

fn is_empty(values: &ColumnShardingValues) -> bool {
    match values {
        ColumnShardingValues::List(list) => list.is_empty(),
        ColumnShardingValues::Range(range) => range.is_empty(),
    }
}

/// Intersection of two constraints on one column; `None` when empty.
fn intersect(a: &ColumnShardingValues, b: &ColumnShardingValues) -> Option<ColumnShardingValues> {
    let merged = match (a, b) {
        (ColumnShardingValues::List(x), ColumnShardingValues::List(y)) => {
            ColumnShardingValues::List(x.iter().filter(|v| y.contains(v)).cloned().collect())
        }
        (ColumnShardingValues::List(list), ColumnShardingValues::Range(range))
        | (ColumnShardingValues::Range(range), ColumnShardingValues::List(list)) => {
            ColumnShardingValues::List(list.iter().filter(|v| range.contains(v)).cloned().collect())
        }
        (ColumnShardingValues::Range(x), ColumnShardingValues::Range(y)) => {
            ColumnShardingValues::Range(x.intersect(y)?)
        }
    };
    (!is_empty(&merged)).then_some(merged)
}
