use crate::context::{RouteContext, RouteMapper, RouteType, RouteUnit};
use crate::rule::ShardingRule;

/// One unit per data source; `tables` keep their names.
pub(crate) fn database_broadcast(rule: &ShardingRule, tables: &[String]) -> RouteContext {
    let mappers: Vec<RouteMapper> = tables.iter().map(|t| RouteMapper::identity(t)).collect();
    RouteContext::with_units(
        RouteType::DatabaseBroadcast,
        rule.data_source_names()
            .iter()
            .map(|ds| RouteUnit::new(RouteMapper::identity(ds), mappers.clone()))
            .collect(),
    )
}

/// One unit per data node of every sharding table; broadcast tables get one
/// unit per data source.
pub(crate) fn table_broadcast(rule: &ShardingRule, tables: &[String]) -> RouteContext {
    let mut ctx = RouteContext::new(RouteType::TableBroadcast);
    for table in tables {
        if let Some(table_rule) = rule.table_rule(table) {
            for node in &table_rule.actual_data_nodes {
                ctx.add_unit(RouteUnit::new(
                    RouteMapper::identity(&node.data_source),
                    vec![RouteMapper::new(table.as_str(), node.table.as_str())],
                ));
            }
        } else if rule.is_broadcast_table(table) {
            for ds in rule.data_source_names() {
                ctx.add_unit(RouteUnit::new(
                    RouteMapper::identity(ds),
                    vec![RouteMapper::identity(table)],
                ));
            }
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::tests::order_rule;

    #[test]
    fn test_database_broadcast_covers_every_data_source() {
        let ctx = database_broadcast(&order_rule(), &["t_config".to_string()]);
        assert_eq!(ctx.route_type(), RouteType::DatabaseBroadcast);
        assert_eq!(ctx.actual_data_source_names(), vec!["ds_0", "ds_1"]);
        assert_eq!(ctx.units()[1].actual_table("t_config"), Some("t_config"));
    }

    #[test]
    fn test_table_broadcast_covers_every_node() {
        let ctx = table_broadcast(&order_rule(), &["t_order".to_string(), "t_config".to_string()]);
        assert_eq!(ctx.units().len(), 6);
        assert_eq!(ctx.units()[3].to_string(), "ds_1:[t_order_1]");
        assert_eq!(ctx.units()[5].to_string(), "ds_1:[t_config]");
    }
}
