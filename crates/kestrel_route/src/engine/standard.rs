//! Standard routing: one sharding table, or several tables of one binding
//! group routed through the first of them.

use kestrel_common::error::{KestrelResult, RouteError};
use kestrel_common::types::DataNode;

use crate::condition::{ShardingCondition, ShardingConditions};
use crate::context::{RouteContext, RouteMapper, RouteType, RouteUnit};
use crate::hint::HintValues;
use crate::rule::{ShardingRule, TableRule};
use crate::strategy::ShardingInput;

pub(crate) struct StandardRoute<'a> {
    pub rule: &'a ShardingRule,
    pub primary: &'a TableRule,
    /// Other tables of the primary's binding group present in the statement.
    pub peers: &'a [String],
    pub hints: &'a HintValues,
}

impl StandardRoute<'_> {
    pub(crate) fn route(&self, conditions: &ShardingConditions) -> KestrelResult<RouteContext> {
        let mut ctx = RouteContext::new(RouteType::Standard);
        let unconstrained = [ShardingCondition::default()];
        let conditions: &[ShardingCondition] = if conditions.conditions.is_empty() {
            &unconstrained
        } else {
            &conditions.conditions
        };
        for condition in conditions {
            for node in self.route_nodes(condition)? {
                ctx.add_unit(self.unit_for(&node)?);
            }
        }
        Ok(ctx)
    }

    /// Insert routing: one condition per row, each row to exactly one node.
    pub(crate) fn route_insert(&self, conditions: &ShardingConditions) -> KestrelResult<RouteContext> {
        let mut ctx = RouteContext::new(RouteType::Standard);
        for (row, condition) in conditions.conditions.iter().enumerate() {
            let nodes = self.route_nodes(condition)?;
            if nodes.len() != 1 {
                return Err(RouteError::Unsupported(format!(
                    "insert row {row} into '{}' routes to {} data nodes, expected exactly one",
                    self.primary.logic_table,
                    nodes.len()
                ))
                .into());
            }
            for node in &nodes {
                ctx.add_unit(self.unit_for(node)?);
            }
            ctx.original_data_nodes.push(nodes);
        }
        Ok(ctx)
    }

    /// Database strategy over the table's data sources, then table strategy
    /// over each chosen data source's tables.
    pub(crate) fn route_nodes(&self, condition: &ShardingCondition) -> KestrelResult<Vec<DataNode>> {
        let logic_table = self.primary.logic_table.as_str();
        let mut value_tables: Vec<&str> = vec![logic_table];
        value_tables.extend(self.peers.iter().map(String::as_str));

        let data_sources = self.primary.database_strategy.do_sharding(
            &self.primary.data_source_names(),
            &ShardingInput {
                logic_table,
                value_tables: &value_tables,
                condition,
                hint_values: self.hints.database_values(logic_table),
            },
        )?;
        let mut nodes = Vec::new();
        for ds in &data_sources {
            let tables = self.primary.table_strategy.do_sharding(
                &self.primary.actual_tables_in(ds),
                &ShardingInput {
                    logic_table,
                    value_tables: &value_tables,
                    condition,
                    hint_values: self.hints.table_values(logic_table),
                },
            )?;
            nodes.extend(tables.into_iter().map(|t| DataNode::new(ds.as_str(), t)));
        }
        Ok(nodes)
    }

    /// The unit for one primary node, binding peers paired by position.
    pub(crate) fn unit_for(&self, node: &DataNode) -> KestrelResult<RouteUnit> {
        let mut tables = vec![RouteMapper::new(
            self.primary.logic_table.as_str(),
            node.table.as_str(),
        )];
        for peer in self.peers {
            let actual = self.rule.binding_actual_table(
                &node.data_source,
                &self.primary.logic_table,
                &node.table,
                peer,
            )?;
            tables.push(RouteMapper::new(peer.as_str(), actual));
        }
        Ok(RouteUnit::new(RouteMapper::identity(&node.data_source), tables))
    }
}
