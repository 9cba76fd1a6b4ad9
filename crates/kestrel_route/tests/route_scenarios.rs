//! End-to-end routing over rule files parsed from TOML.

use std::sync::Arc;

use kestrel_algorithm::AlgorithmRegistry;
use kestrel_common::config::KestrelConfig;
use kestrel_common::datum::Datum;
use kestrel_common::statement::{
    BoundStatement, ConditionGroup, InsertRow, InsertSegment, Predicate, RangeBound,
    StatementKind, ValueExpr,
};
use kestrel_common::types::DataNode;
use kestrel_route::{
    DataSourceStateRegistry, DisabledDataSources, HintValues, ReadwriteSplittingRule, RouteContext,
    RouteEngine, RouteType, SessionState, ShardingRule,
};

const ORDER_RULES: &str = r#"
[[data_sources]]
name = "ds_0"

[[data_sources]]
name = "ds_1"

[sharding]
broadcast_tables = ["t_config"]
binding_tables = [["t_order", "t_order_item"]]

[sharding.tables.t_order]
actual_data_nodes = "ds_0.t_order_${0..1}, ds_1.t_order_${2..3}"
database_strategy = { type = "standard", sharding_column = "order_id", algorithm = "db_inline" }
table_strategy = { type = "standard", sharding_column = "order_id", algorithm = "table_mod" }
key_generate = { column = "order_id", generator = "snowflake" }

[sharding.tables.t_order_item]
actual_data_nodes = "ds_0.t_order_item_${0..1}, ds_1.t_order_item_${2..3}"
database_strategy = { type = "standard", sharding_column = "order_id", algorithm = "db_inline" }
table_strategy = { type = "standard", sharding_column = "order_id", algorithm = "table_mod" }

[sharding.tables.t_user]
actual_data_nodes = "ds_${0..1}.t_user"
database_strategy = { type = "standard", sharding_column = "user_id", algorithm = "user_mod" }

[sharding.tables.t_audit]
actual_data_nodes = "ds_${0..1}.t_audit_${0..1}"
database_strategy = { type = "hint", algorithm = "hint_db" }
table_strategy = { type = "hint", algorithm = "hint_table" }

[sharding.algorithms.db_inline]
type = "INLINE"
props = { algorithm-expression = "ds_${order_id % 4 / 2}" }

[sharding.algorithms.table_mod]
type = "MOD"
props = { sharding-count = 4 }

[sharding.algorithms.user_mod]
type = "MOD"
props = { sharding-count = 2 }

[sharding.algorithms.hint_db]
type = "HINT_INLINE"
props = { algorithm-expression = "ds_${value % 2}" }

[sharding.algorithms.hint_table]
type = "HINT_INLINE"
props = { algorithm-expression = "t_audit_${value % 2}" }

[sharding.key_generators.snowflake]
type = "SNOWFLAKE"
"#;

const READWRITE_RULES: &str = r#"
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

fn engine(rules: &str) -> RouteEngine {
    let config = KestrelConfig::from_toml_str(rules).unwrap();
    let registry = AlgorithmRegistry::with_builtins();
    RouteEngine::new(
        Arc::new(ShardingRule::new(&config, &registry).unwrap()),
        Arc::new(ReadwriteSplittingRule::new(&config, &registry).unwrap()),
    )
}

fn route(engine: &RouteEngine, stmt: &BoundStatement) -> RouteContext {
    engine
        .route(
            stmt,
            &[],
            &HintValues::new(),
            &SessionState::default(),
            &DisabledDataSources::none(),
        )
        .unwrap()
}

fn units(ctx: &RouteContext) -> Vec<String> {
    ctx.units().iter().map(ToString::to_string).collect()
}

fn lit(v: i64) -> ValueExpr {
    ValueExpr::Literal(Datum::Int64(v))
}

fn select(tables: &[&str], predicates: Vec<Predicate>) -> BoundStatement {
    let mut stmt = BoundStatement::new(StatementKind::Select);
    stmt.tables = tables.iter().map(|t| t.to_string()).collect();
    if !predicates.is_empty() {
        stmt.conditions = vec![ConditionGroup::new(predicates)];
    }
    stmt
}

#[test]
fn test_equality_routes_to_one_node() {
    let engine = engine(ORDER_RULES);
    let stmt = select(&["t_order"], vec![Predicate::eq("t_order", "order_id", lit(13))]);
    let ctx = route(&engine, &stmt);
    assert_eq!(ctx.route_type(), RouteType::Standard);
    assert_eq!(units(&ctx), vec!["ds_0:[t_order_1]"]);
    // Deterministic for the same value and rules.
    assert_eq!(units(&route(&engine, &stmt)), units(&ctx));
}

#[test]
fn test_in_list_is_union_of_values() {
    let engine = engine(ORDER_RULES);
    let stmt = select(
        &["t_order"],
        vec![Predicate::in_list("t_order", "order_id", vec![lit(1), lit(2), lit(5)])],
    );
    let ctx = route(&engine, &stmt);
    assert_eq!(units(&ctx), vec!["ds_0:[t_order_1]", "ds_1:[t_order_2]"]);
}

#[test]
fn test_no_condition_routes_to_every_node() {
    let engine = engine(ORDER_RULES);
    let stmt = select(&["t_order"], vec![Predicate::eq("t_order", "status", lit(1))]);
    let ctx = route(&engine, &stmt);
    assert_eq!(ctx.units().len(), 4);
    assert_eq!(
        units(&ctx),
        vec!["ds_0:[t_order_0]", "ds_0:[t_order_1]", "ds_1:[t_order_2]", "ds_1:[t_order_3]"]
    );
}

#[test]
fn test_range_rejected_by_inline_database_strategy() {
    let engine = engine(ORDER_RULES);
    let stmt = select(
        &["t_order"],
        vec![Predicate::range(
            "t_order",
            "order_id",
            Some(RangeBound {
                value: lit(1),
                inclusive: true,
            }),
            Some(RangeBound {
                value: lit(2),
                inclusive: true,
            }),
        )],
    );
    let err = engine
        .route(
            &stmt,
            &[],
            &HintValues::new(),
            &SessionState::default(),
            &DisabledDataSources::none(),
        )
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_contradiction_routes_to_single_unit() {
    let engine = engine(ORDER_RULES);
    let stmt = select(
        &["t_order"],
        vec![
            Predicate::eq("t_order", "order_id", lit(1)),
            Predicate::eq("t_order", "order_id", lit(2)),
        ],
    );
    let ctx = route(&engine, &stmt);
    assert_eq!(ctx.route_type(), RouteType::Unicast);
    assert_eq!(ctx.units().len(), 1);
}

#[test]
fn test_binding_tables_route_together_with_broadcast() {
    let engine = engine(ORDER_RULES);
    let stmt = select(
        &["t_order", "t_order_item", "t_config"],
        vec![Predicate::eq("t_order", "order_id", lit(6))],
    );
    let ctx = route(&engine, &stmt);
    assert_eq!(units(&ctx), vec!["ds_1:[t_order_2, t_order_item_2, t_config]"]);
}

#[test]
fn test_unbound_tables_combine_per_data_source() {
    let engine = engine(ORDER_RULES);
    let stmt = select(
        &["t_order", "t_user"],
        vec![
            Predicate::eq("t_order", "order_id", lit(2)),
            Predicate::eq("t_user", "user_id", lit(7)),
        ],
    );
    let ctx = route(&engine, &stmt);
    assert_eq!(ctx.route_type(), RouteType::Complex);
    assert_eq!(units(&ctx), vec!["ds_1:[t_order_2, t_user]"]);

    let disjoint = select(
        &["t_order", "t_user"],
        vec![
            Predicate::eq("t_order", "order_id", lit(2)),
            Predicate::eq("t_user", "user_id", lit(4)),
        ],
    );
    assert!(engine
        .route(
            &disjoint,
            &[],
            &HintValues::new(),
            &SessionState::default(),
            &DisabledDataSources::none(),
        )
        .is_err());
}

#[test]
fn test_hint_strategy() {
    let engine = engine(ORDER_RULES);
    let stmt = select(&["t_audit"], vec![]);
    assert_eq!(route(&engine, &stmt).units().len(), 4);

    let mut hints = HintValues::new();
    hints.add_database_value("t_audit", Datum::Int64(1));
    hints.add_table_value("t_audit", Datum::Int64(0));
    let ctx = engine
        .route(
            &stmt,
            &[],
            &hints,
            &SessionState::default(),
            &DisabledDataSources::none(),
        )
        .unwrap();
    assert_eq!(units(&ctx), vec!["ds_1:[t_audit_0]"]);
}

#[test]
fn test_insert_generates_keys_and_records_nodes() {
    let engine = engine(ORDER_RULES);
    let mut stmt = BoundStatement::new(StatementKind::Insert);
    stmt.tables = vec!["t_order".into()];
    stmt.insert = Some(InsertSegment {
        table: "t_order".into(),
        columns: vec!["status".into()],
        columns_stop: None,
        rows: (0..3)
            .map(|_| InsertRow {
                start: 0,
                stop: 0,
                values: vec![lit(0)],
            })
            .collect(),
    });
    let ctx = route(&engine, &stmt);
    let keys = ctx.generated_keys.as_ref().unwrap();
    assert_eq!(keys.column, "order_id");
    assert_eq!(keys.values.len(), 3);
    assert_eq!(ctx.original_data_nodes.len(), 3);
    for (row, nodes) in ctx.original_data_nodes.iter().enumerate() {
        let key = keys.values[row].as_i64().unwrap();
        let expected = DataNode::new(
            format!("ds_{}", key % 4 / 2),
            format!("t_order_{}", key % 4),
        );
        assert_eq!(nodes, &vec![expected]);
    }
    let total: usize = ctx.units().iter().map(|u| ctx.insert_rows_for(u).len()).sum();
    assert_eq!(total, 3);
}

#[test]
fn test_statement_kinds_without_conditions() {
    let engine = engine(ORDER_RULES);

    let ddl = {
        let mut s = BoundStatement::new(StatementKind::Ddl);
        s.tables = vec!["t_order".into()];
        s
    };
    let ctx = route(&engine, &ddl);
    assert_eq!(ctx.route_type(), RouteType::TableBroadcast);
    assert_eq!(ctx.units().len(), 4);

    let ctx = route(&engine, &BoundStatement::new(StatementKind::Tcl));
    assert_eq!(ctx.route_type(), RouteType::DatabaseBroadcast);
    assert_eq!(ctx.actual_data_source_names(), vec!["ds_0", "ds_1"]);

    let ctx = route(&engine, &BoundStatement::new(StatementKind::Use));
    assert_eq!(ctx.route_type(), RouteType::Ignore);
    assert!(ctx.is_empty());

    let mut show = BoundStatement::new(StatementKind::Show);
    show.requires_broadcast = false;
    let ctx = route(&engine, &show);
    assert!(ctx.is_single_unit());

    let mut update_config = BoundStatement::new(StatementKind::Update);
    update_config.tables = vec!["t_config".into()];
    assert_eq!(route(&engine, &update_config).route_type(), RouteType::DatabaseBroadcast);
    let read_config = select(&["t_config"], vec![]);
    assert!(route(&engine, &read_config).is_single_unit());
}

#[test]
fn test_update_of_sharding_column_rejected() {
    let engine = engine(ORDER_RULES);
    let mut stmt = BoundStatement::new(StatementKind::Update);
    stmt.tables = vec!["t_order".into()];
    stmt.assignments = vec!["order_id".into()];
    let err = engine
        .route(
            &stmt,
            &[],
            &HintValues::new(),
            &SessionState::default(),
            &DisabledDataSources::none(),
        )
        .unwrap_err();
    assert!(err.is_user_error());
}

#[test]
fn test_disabled_replicas() {
    let engine = engine(READWRITE_RULES);
    let registry = DataSourceStateRegistry::new();
    let stmt = select(&["t_account"], vec![]);
    let read = |disabled: &DisabledDataSources| {
        engine
            .route(&stmt, &[], &HintValues::new(), &SessionState::default(), disabled)
            .unwrap()
            .units()[0]
            .data_source
            .actual_name
            .clone()
    };

    registry.disable("ds_r0");
    let snapshot = registry.snapshot();
    for _ in 0..100 {
        assert_eq!(read(&snapshot), "ds_r1");
    }

    registry.disable("ds_r1");
    let snapshot = registry.snapshot();
    assert_eq!(read(&snapshot), "ds_w");

    registry.enable("ds_r0");
    registry.enable("ds_r1");
    let snapshot = registry.snapshot();
    let picks: Vec<String> = (0..4).map(|_| read(&snapshot)).collect();
    assert!(picks.contains(&"ds_r0".to_string()));
    assert!(picks.contains(&"ds_r1".to_string()));
}
