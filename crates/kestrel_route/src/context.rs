//! Route results: units of (data source, tables) a statement executes on.

use std::fmt;

use kestrel_common::datum::Datum;
use kestrel_common::types::DataNode;

/// A logical name and the physical name it resolves to in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: impl Into<String>, actual_name: impl Into<String>) -> Self {
        Self {
            logic_name: logic_name.into(),
            actual_name: actual_name.into(),
        }
    }

    /// Broadcast and single tables keep their name.
    pub fn identity(name: &str) -> Self {
        Self::new(name, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub tables: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source: RouteMapper, tables: Vec<RouteMapper>) -> Self {
        Self { data_source, tables }
    }

    /// Actual table for a logical table, matched case-insensitively.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|m| m.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_name.as_str())
    }

    /// Whether this unit executes on the given physical node.
    pub fn contains_node(&self, node: &DataNode) -> bool {
        self.data_source.logic_name == node.data_source
            && self.tables.iter().any(|m| m.actual_name == node.table)
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_source.actual_name)?;
        if self.data_source.actual_name != self.data_source.logic_name {
            write!(f, "({})", self.data_source.logic_name)?;
        }
        let tables: Vec<&str> = self.tables.iter().map(|m| m.actual_name.as_str()).collect();
        write!(f, ":[{}]", tables.join(", "))
    }
}

/// The engine that produced a route context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    /// One table or one binding group narrowed by sharding conditions.
    Standard,
    /// Several independently sharded tables combined per data source.
    Complex,
    /// One unit per data source.
    DatabaseBroadcast,
    /// One unit per data node of the referenced tables.
    TableBroadcast,
    /// Exactly one unit.
    Unicast,
    /// Nothing to execute (`USE`).
    Ignore,
}

impl RouteType {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteType::Standard => "standard",
            RouteType::Complex => "complex",
            RouteType::DatabaseBroadcast => "database_broadcast",
            RouteType::TableBroadcast => "table_broadcast",
            RouteType::Unicast => "unicast",
            RouteType::Ignore => "ignore",
        }
    }
}

/// Keys generated for an insert that omitted the key column, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeys {
    pub column: String,
    pub values: Vec<Datum>,
}

#[derive(Debug, Clone)]
pub struct RouteContext {
    route_type: RouteType,
    units: Vec<RouteUnit>,
    /// Insert only: per value row, the data nodes the row routes to.
    pub original_data_nodes: Vec<Vec<DataNode>>,
    pub generated_keys: Option<GeneratedKeys>,
}

impl RouteContext {
    pub fn new(route_type: RouteType) -> Self {
        Self {
            route_type,
            units: Vec::new(),
            original_data_nodes: Vec::new(),
            generated_keys: None,
        }
    }

    pub fn with_units(route_type: RouteType, units: Vec<RouteUnit>) -> Self {
        let mut ctx = Self::new(route_type);
        for unit in units {
            ctx.add_unit(unit);
        }
        ctx
    }

    /// Append a unit unless an equal one is present; first-seen order wins.
    pub fn add_unit(&mut self, unit: RouteUnit) {
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    pub fn route_type(&self) -> RouteType {
        self.route_type
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub(crate) fn units_mut(&mut self) -> &mut [RouteUnit] {
        &mut self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    /// Actual data source names, deduplicated in unit order.
    pub fn actual_data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            let name = unit.data_source.actual_name.as_str();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Indexes of the insert rows that route to `unit`.
    pub fn insert_rows_for(&self, unit: &RouteUnit) -> Vec<usize> {
        self.original_data_nodes
            .iter()
            .enumerate()
            .filter(|(_, nodes)| nodes.iter().any(|n| unit.contains_node(n)))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(ds: &str, table: &str) -> RouteUnit {
        RouteUnit::new(
            RouteMapper::identity(ds),
            vec![RouteMapper::new("t_order", table)],
        )
    }

    #[test]
    fn test_units_dedup_in_first_seen_order() {
        let ctx = RouteContext::with_units(
            RouteType::Standard,
            vec![
                unit("ds_1", "t_order_1"),
                unit("ds_0", "t_order_0"),
                unit("ds_1", "t_order_1"),
            ],
        );
        assert_eq!(ctx.units().len(), 2);
        assert_eq!(ctx.units()[0].data_source.logic_name, "ds_1");
        assert_eq!(ctx.actual_data_source_names(), vec!["ds_1", "ds_0"]);
    }

    #[test]
    fn test_insert_rows_for_unit() {
        let mut ctx = RouteContext::with_units(
            RouteType::Standard,
            vec![unit("ds_0", "t_order_0"), unit("ds_1", "t_order_1")],
        );
        ctx.original_data_nodes = vec![
            vec![DataNode::new("ds_1", "t_order_1")],
            vec![DataNode::new("ds_0", "t_order_0")],
            vec![DataNode::new("ds_1", "t_order_1")],
        ];
        assert_eq!(ctx.insert_rows_for(&ctx.units()[0]), vec![1]);
        assert_eq!(ctx.insert_rows_for(&ctx.units()[1]), vec![0, 2]);
    }

    #[test]
    fn test_unit_display() {
        let mut u = unit("ds_0", "t_order_0");
        u.data_source.actual_name = "read_ds_0".into();
        assert_eq!(u.to_string(), "read_ds_0(ds_0):[t_order_0]");
        assert_eq!(u.actual_table("T_ORDER"), Some("t_order_0"));
    }
}
