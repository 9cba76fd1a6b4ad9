//! Route engine: picks a routing path per statement and applies read-write
//! splitting to the result.

mod broadcast;
mod complex;
mod standard;
mod unicast;

use std::sync::Arc;

use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelResult, RouteError};
use kestrel_common::statement::{BoundStatement, StatementKind};

use crate::condition::ShardingConditions;
use crate::context::{GeneratedKeys, RouteContext, RouteMapper, RouteType, RouteUnit};
use crate::hint::HintValues;
use crate::readwrite::{DisabledDataSources, ReadwriteSplittingRule, SessionState};
use crate::rule::{ShardingRule, TableRule};
use crate::validator;

use self::standard::StandardRoute;

/// Stateless apart from the shared rules; one engine serves every session.
#[derive(Debug, Clone)]
pub struct RouteEngine {
    sharding: Arc<ShardingRule>,
    readwrite: Arc<ReadwriteSplittingRule>,
}

impl RouteEngine {
    pub fn new(sharding: Arc<ShardingRule>, readwrite: Arc<ReadwriteSplittingRule>) -> Self {
        Self {
            sharding,
            readwrite,
        }
    }

    pub fn sharding_rule(&self) -> &ShardingRule {
        &self.sharding
    }

    pub fn readwrite_rule(&self) -> &ReadwriteSplittingRule {
        &self.readwrite
    }

    /// Route one statement. Performs no I/O; fails only on configuration
    /// errors, unsupported statements and unresolvable parameters.
    pub fn route(
        &self,
        stmt: &BoundStatement,
        params: &[Datum],
        hints: &HintValues,
        session: &SessionState,
        disabled: &DisabledDataSources,
    ) -> KestrelResult<RouteContext> {
        validator::validate(stmt, &self.sharding)?;
        let tables: Vec<String> = stmt.tables.iter().map(|t| t.to_ascii_lowercase()).collect();
        let mut ctx = match stmt.kind {
            StatementKind::Use => RouteContext::new(RouteType::Ignore),
            StatementKind::Tcl | StatementKind::Set => broadcast::database_broadcast(&self.sharding, &[]),
            StatementKind::Ddl | StatementKind::Dcl => self.route_ddl(&tables),
            StatementKind::Show => self.route_show(stmt, &tables),
            StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
                self.route_dml(stmt, params, hints, &tables)?
            }
            StatementKind::Insert => self.route_insert(stmt, params, hints, &tables)?,
        };
        self.readwrite.apply(&mut ctx, stmt, hints, session, disabled);

        tracing::debug!(
            kind = ?stmt.kind,
            route_type = ctx.route_type().as_str(),
            units = ctx.units().len(),
            "routed: {}",
            ctx.units()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
        kestrel_observability::record_route(ctx.route_type().as_str(), ctx.units().len());
        Ok(ctx)
    }

    fn route_ddl(&self, tables: &[String]) -> RouteContext {
        let rule = &self.sharding;
        if tables.iter().any(|t| rule.is_sharding_table(t)) {
            broadcast::table_broadcast(rule, tables)
        } else if tables.iter().all(|t| rule.is_broadcast_table(t)) {
            broadcast::database_broadcast(rule, tables)
        } else {
            unicast::unicast(rule.default_data_source(), tables)
        }
    }

    fn route_show(&self, stmt: &BoundStatement, tables: &[String]) -> RouteContext {
        let rule = &self.sharding;
        let sharded = tables.iter().find_map(|t| rule.table_rule(t));
        if stmt.requires_broadcast {
            return match sharded {
                Some(_) => broadcast::table_broadcast(rule, tables),
                None => broadcast::database_broadcast(rule, tables),
            };
        }
        match sharded.and_then(|t| t.actual_data_nodes.first().map(|n| (t, n))) {
            Some((table_rule, node)) => RouteContext::with_units(
                RouteType::Unicast,
                vec![RouteUnit::new(
                    RouteMapper::identity(&node.data_source),
                    vec![RouteMapper::new(table_rule.logic_table.as_str(), node.table.as_str())],
                )],
            ),
            None => unicast::unicast(rule.default_data_source(), tables),
        }
    }

    /// DML over tables no sharding rule drives.
    fn route_unsharded(&self, stmt: &BoundStatement, tables: &[String]) -> RouteContext {
        let rule = &self.sharding;
        let all_broadcast = !tables.is_empty() && tables.iter().all(|t| rule.is_broadcast_table(t));
        if all_broadcast && !stmt.is_read_only() {
            return broadcast::database_broadcast(rule, tables);
        }
        let data_source = if all_broadcast {
            rule.data_source_names()
                .first()
                .map(String::as_str)
                .unwrap_or(rule.default_data_source())
        } else {
            rule.default_data_source()
        };
        unicast::unicast(data_source, tables)
    }

    fn route_dml(
        &self,
        stmt: &BoundStatement,
        params: &[Datum],
        hints: &HintValues,
        tables: &[String],
    ) -> KestrelResult<RouteContext> {
        let rule = &self.sharding;
        let sharded: Vec<&TableRule> = tables.iter().filter_map(|t| rule.table_rule(t)).collect();
        if sharded.is_empty() {
            return Ok(self.route_unsharded(stmt, tables));
        }
        let conditions = ShardingConditions::from_statement(stmt, params, rule)?;
        let mut ctx = self.route_sharded(&sharded, &conditions, hints)?;
        if conditions.always_false || ctx.is_empty() {
            // No row can match; one unit is enough to produce the empty result.
            let full = self.route_sharded(&sharded, &ShardingConditions::default(), hints)?;
            ctx = RouteContext::with_units(RouteType::Unicast, full.units().iter().take(1).cloned().collect());
        }
        self.attach_unsharded(&mut ctx, tables)?;
        Ok(ctx)
    }

    fn route_insert(
        &self,
        stmt: &BoundStatement,
        params: &[Datum],
        hints: &HintValues,
        tables: &[String],
    ) -> KestrelResult<RouteContext> {
        let rule = &self.sharding;
        let target = stmt
            .insert
            .as_ref()
            .map(|i| i.table.to_ascii_lowercase())
            .or_else(|| tables.first().cloned());
        let Some(table_rule) = target.as_deref().and_then(|t| rule.table_rule(t)) else {
            return Ok(self.route_unsharded(stmt, tables));
        };
        let generated = self.generate_keys(stmt, table_rule)?;
        let conditions = ShardingConditions::from_insert(stmt, params, rule, generated.as_ref())?;
        let route = StandardRoute {
            rule,
            primary: table_rule,
            peers: &[],
            hints,
        };
        let mut ctx = route.route_insert(&conditions)?;
        ctx.generated_keys = generated;
        self.attach_unsharded(&mut ctx, tables)?;
        Ok(ctx)
    }

    /// One key per row when the table generates its key column and the insert
    /// leaves it out.
    fn generate_keys(
        &self,
        stmt: &BoundStatement,
        table_rule: &TableRule,
    ) -> KestrelResult<Option<GeneratedKeys>> {
        let (Some(insert), Some(key_generate)) = (&stmt.insert, &table_rule.key_generate) else {
            return Ok(None);
        };
        if insert.column_index(&key_generate.column).is_some() {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(insert.rows.len());
        for _ in &insert.rows {
            values.push(key_generate.algorithm.generate_key()?);
        }
        tracing::debug!(
            table = %table_rule.logic_table,
            column = %key_generate.column,
            keys = values.len(),
            "generated keys"
        );
        Ok(Some(GeneratedKeys {
            column: key_generate.column.clone(),
            values,
        }))
    }

    /// Route sharding tables: binding groups route through their first
    /// member; several groups combine per data source.
    fn route_sharded(
        &self,
        sharded: &[&TableRule],
        conditions: &ShardingConditions,
        hints: &HintValues,
    ) -> KestrelResult<RouteContext> {
        let rule = &self.sharding;
        let mut assigned: Vec<&str> = Vec::new();
        let mut routed = Vec::new();
        for primary in sharded {
            if assigned.contains(&primary.logic_table.as_str()) {
                continue;
            }
            assigned.push(&primary.logic_table);
            let peers: Vec<String> = match rule.binding_group(&primary.logic_table) {
                Some(group) => sharded
                    .iter()
                    .map(|t| t.logic_table.as_str())
                    .filter(|t| *t != primary.logic_table && group.iter().any(|g| g.as_str() == *t))
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            };
            for peer in &peers {
                if let Some(name) = sharded.iter().find(|t| &t.logic_table == peer) {
                    assigned.push(&name.logic_table);
                }
            }
            let route = StandardRoute {
                rule,
                primary,
                peers: &peers,
                hints,
            };
            routed.push(route.route(conditions)?);
        }
        if routed.len() == 1 {
            return Ok(routed.remove(0));
        }
        complex::combine(routed)
    }

    /// Broadcast tables join every unit; single tables require every unit to
    /// sit on the default data source.
    fn attach_unsharded(&self, ctx: &mut RouteContext, tables: &[String]) -> KestrelResult<()> {
        let rule = &self.sharding;
        let extra: Vec<&String> = tables.iter().filter(|t| !rule.is_sharding_table(t)).collect();
        if extra.is_empty() {
            return Ok(());
        }
        let default = rule.default_data_source();
        if let Some(single) = extra.iter().find(|t| !rule.is_broadcast_table(t)) {
            if let Some(unit) = ctx.units().iter().find(|u| u.data_source.logic_name != default) {
                return Err(RouteError::Unsupported(format!(
                    "table '{single}' lives on '{default}' but the statement also routes to '{}'",
                    unit.data_source.logic_name
                ))
                .into());
            }
        }
        for unit in ctx.units_mut() {
            for table in &extra {
                unit.tables.push(RouteMapper::identity(table));
            }
        }
        Ok(())
    }
}
