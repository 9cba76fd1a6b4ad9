use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::statement::{NullsOrder, OrderDirection};

/// A physical location of a logical table: `<data_source>.<actual_table>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse the `ds.table` form used in actual-data-node expressions.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ConfigError::InvalidDataNode(text.to_string())),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// SQL dialect of the logical database. Only affects NULL ordering defaults
/// and pagination syntax; parsing is done upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    PostgreSql,
    OpenGauss,
    Oracle,
    SqlServer,
}

impl Dialect {
    /// MySQL and SQL Server sort NULL as the smallest value; the others as the largest.
    pub fn nulls_are_smallest(self) -> bool {
        matches!(self, Dialect::MySql | Dialect::SqlServer)
    }

    /// NULL placement used when an ORDER BY item does not say `NULLS FIRST/LAST`.
    pub fn default_nulls(self, direction: OrderDirection) -> NullsOrder {
        match (self.nulls_are_smallest(), direction) {
            (true, OrderDirection::Asc) | (false, OrderDirection::Desc) => NullsOrder::First,
            (true, OrderDirection::Desc) | (false, OrderDirection::Asc) => NullsOrder::Last,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::MySql => "mysql",
            Dialect::PostgreSql => "postgresql",
            Dialect::OpenGauss => "opengauss",
            Dialect::Oracle => "oracle",
            Dialect::SqlServer => "sqlserver",
        };
        f.write_str(name)
    }
}
