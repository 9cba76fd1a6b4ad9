//! Statement checks that run before routing.

use kestrel_common::error::{KestrelResult, RouteError};
use kestrel_common::statement::{BoundStatement, StatementKind};

use crate::rule::ShardingRule;

pub fn validate(stmt: &BoundStatement, rule: &ShardingRule) -> KestrelResult<()> {
    match stmt.kind {
        StatementKind::Update => validate_update(stmt, rule),
        StatementKind::Insert => validate_insert(stmt, rule),
        _ => Ok(()),
    }
}

/// Moving a row between shards is not an UPDATE the core can express.
fn validate_update(stmt: &BoundStatement, rule: &ShardingRule) -> KestrelResult<()> {
    for table in &stmt.tables {
        if let Some(column) = stmt
            .assignments
            .iter()
            .find(|c| rule.is_sharding_column(table, c))
        {
            return Err(RouteError::Unsupported(format!(
                "can not update sharding column '{column}' of table '{table}'"
            ))
            .into());
        }
    }
    Ok(())
}

fn validate_insert(stmt: &BoundStatement, rule: &ShardingRule) -> KestrelResult<()> {
    let Some(insert) = &stmt.insert else {
        if stmt.tables.iter().any(|t| rule.is_sharding_table(t)) {
            return Err(RouteError::InvalidCondition(
                "insert into a sharding table without a values segment".into(),
            )
            .into());
        }
        return Ok(());
    };
    if !rule.is_sharding_table(&insert.table) {
        return Ok(());
    }
    if insert.columns.is_empty() {
        return Err(RouteError::Unsupported(format!(
            "insert into sharding table '{}' requires a column list",
            insert.table
        ))
        .into());
    }
    if insert.rows.is_empty() {
        return Err(RouteError::InvalidCondition(format!(
            "insert into '{}' has no value rows",
            insert.table
        ))
        .into());
    }
    for (i, row) in insert.rows.iter().enumerate() {
        if row.values.len() != insert.columns.len() {
            return Err(RouteError::InvalidCondition(format!(
                "insert row {i} has {} values for {} columns",
                row.values.len(),
                insert.columns.len()
            ))
            .into());
        }
    }
    Ok(())
}
