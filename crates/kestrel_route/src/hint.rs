use std::collections::BTreeMap;

use kestrel_common::datum::Datum;

/// Sharding values and routing switches supplied with a statement rather
/// than extracted from it. Passed explicitly into every route call; tables
/// are keyed by lowercase logical name.
#[derive(Debug, Clone, Default)]
pub struct HintValues {
    database_values: BTreeMap<String, Vec<Datum>>,
    table_values: BTreeMap<String, Vec<Datum>>,
    /// Force read-write splitting to the write data source.
    pub write_route_only: bool,
}

impl HintValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database_value(&mut self, logic_table: &str, value: Datum) {
        self.database_values
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    pub fn add_table_value(&mut self, logic_table: &str, value: Datum) {
        self.table_values
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    pub fn set_write_route_only(&mut self) {
        self.write_route_only = true;
    }

    pub fn database_values(&self, logic_table: &str) -> Option<&[Datum]> {
        self.database_values
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    pub fn table_values(&self, logic_table: &str) -> Option<&[Datum]> {
        self.table_values
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.database_values.is_empty() && self.table_values.is_empty() && !self.write_route_only
    }
}
