#![allow(dead_code, unused_imports)]

pub use std::collections::{BTreeMap, BTreeSet};
pub use std::sync::Arc;

pub use kestrel_algorithm::AlgorithmRegistry;
pub use kestrel_common::config::KestrelConfig;
pub use kestrel_common::datum::Datum;
pub use kestrel_common::error::{ErrorKind, ExecutionError, KestrelError, KestrelResult};
pub use kestrel_common::statement::{
    AggregationKind, AggregationProjection, BoundStatement, ConditionGroup, OrderByItem,
    OrderDirection, Pagination, PaginationSegment, PaginationStyle, PaginationValue, Predicate,
    StatementKind, TableSegment, ValueExpr,
};
pub use kestrel_kernel::{
    ExecutionBoundary, HealthCheckFallback, KernelProcessor, QueryContext,
};
pub use kestrel_merge::{collect_rows, MemoryQueryResult, QueryResult};
pub use kestrel_rewrite::ExecutionUnit;
pub use kestrel_route::{DataSourceStateRegistry, SessionState};
use parking_lot::Mutex;

/// `t_order` by `order_id % 4` over two data sources holding two tables each.
pub const ORDER_RULES: &str = r#"
[props]
sql_show = true

[[data_sources]]
name = "ds_0"

[[data_sources]]
name = "ds_1"

[sharding.tables.t_order]
actual_data_nodes = "ds_0.t_order_${0..1}, ds_1.t_order_${2..3}"
database_strategy = { type = "standard", sharding_column = "order_id", algorithm = "db_inline" }
table_strategy = { type = "standard", sharding_column = "order_id", algorithm = "table_mod" }

[sharding.algorithms.db_inline]
type = "INLINE"
props = { algorithm-expression = "ds_${order_id % 4 / 2}" }

[sharding.algorithms.table_mod]
type = "MOD"
props = { sharding-count = 4 }
"#;

/// One read-write group `ds` with a write member and two replicas.
pub const READWRITE_RULES: &str = r#"
[[data_sources]]
name = "ds_w"

[[data_sources]]
name = "ds_r0"

[[data_sources]]
name = "ds_r1"

[sharding]
single_tables = ["t_account"]

[readwrite_splitting.groups.ds]
write_data_source = "ds_w"
read_data_sources = ["ds_r0", "ds_r1"]
"#;

pub fn setup(rules: &str) -> KernelProcessor {
    let config = KestrelConfig::from_toml_str(rules).unwrap();
    KernelProcessor::new(&config, &AlgorithmRegistry::with_builtins()).unwrap()
}

/// Byte span of the first `needle` after `anchor`.
pub fn span(sql: &str, anchor: &str, needle: &str) -> (usize, usize) {
    let from = sql.find(anchor).unwrap();
    let start = from + sql[from..].find(needle).unwrap();
    (start, start + needle.len())
}

/// A select over one logical table with the table name found after FROM.
pub fn select_from(sql: &str, table: &str, columns: usize) -> BoundStatement {
    let mut stmt = BoundStatement::new(StatementKind::Select);
    stmt.tables = vec![table.to_string()];
    let (start, stop) = span(sql, "FROM", table);
    stmt.table_segments = vec![TableSegment::new(start, stop, table)];
    stmt.projections.column_count = columns;
    stmt
}

pub fn literal_segment(sql: &str, anchor: &str, needle: &str, value: u64) -> PaginationSegment {
    let (start, stop) = span(sql, anchor, needle);
    PaginationSegment {
        start,
        stop,
        value: PaginationValue::Literal(value),
        bound_opened: false,
    }
}

/// In-memory execution boundary: rows keyed by data source and actual
/// table, found by scanning the rewritten SQL for the table name.
#[derive(Default)]
pub struct MemoryBoundary {
    tables: BTreeMap<(String, String), Vec<Vec<Datum>>>,
    failing: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MemoryBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, data_source: &str, table: &str, rows: Vec<Vec<Datum>>) -> Self {
        self.tables
            .insert((data_source.to_string(), table.to_string()), rows);
        self
    }

    pub fn failing(mut self, data_source: &str) -> Self {
        self.failing.insert(data_source.to_string());
        self
    }

    /// Data sources called so far, sorted.
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }
}

impl ExecutionBoundary for MemoryBoundary {
    fn execute(&self, unit: &ExecutionUnit) -> KestrelResult<Box<dyn QueryResult>> {
        self.calls.lock().push(unit.data_source.clone());
        if self.failing.contains(&unit.data_source) {
            return Err(ExecutionError::Failed {
                data_source: unit.data_source.clone(),
                reason: "connection refused".into(),
                retryable: false,
            }
            .into());
        }
        let words: BTreeSet<&str> = unit
            .sql
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .collect();
        let rows = self
            .tables
            .iter()
            .filter(|((ds, table), _)| *ds == unit.data_source && words.contains(table.as_str()))
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect();
        Ok(Box::new(MemoryQueryResult::from_rows(rows)))
    }
}

pub fn int(v: i64) -> Datum {
    Datum::Int64(v)
}
