use std::path::Path;

use anyhow::{Context, Result};
use kestrel_algorithm::AlgorithmRegistry;
use kestrel_common::config::{load_config, KestrelConfig};
use kestrel_common::datum::Datum;
use kestrel_common::statement::BoundStatement;
use kestrel_kernel::{KernelProcessor, QueryContext};
use kestrel_route::SessionState;
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct UnitView<'a> {
    data_source: &'a str,
    sql: &'a str,
    params: &'a [Datum],
}

fn processor(config: &KestrelConfig) -> Result<KernelProcessor> {
    KernelProcessor::new(config, &AlgorithmRegistry::with_builtins())
        .context("Rule file is not usable")
}

pub fn check(path: &Path) -> Result<String> {
    let config = load_config(path)
        .with_context(|| format!("Cannot load rule file: {}", path.display()))?;
    processor(&config)?;
    Ok(format!(
        "OK: {} data sources, {} sharding tables, {} broadcast tables, {} read-write groups",
        config.data_sources.len(),
        config.sharding.tables.len(),
        config.sharding.broadcast_tables.len(),
        config.readwrite_splitting.groups.len()
    ))
}

pub fn route(
    config_path: &Path,
    statement_path: &Path,
    sql: &str,
    raw_params: &[String],
    json: bool,
) -> Result<String> {
    let config = load_config(config_path)
        .with_context(|| format!("Cannot load rule file: {}", config_path.display()))?;
    let kernel = processor(&config)?;
    let content = std::fs::read_to_string(statement_path)
        .with_context(|| format!("Cannot read statement: {}", statement_path.display()))?;
    let stmt: BoundStatement =
        serde_json::from_str(&content).context("Statement is not a valid bound statement")?;
    let params: Vec<Datum> = raw_params.iter().map(|p| parse_param(p)).collect();
    debug!("Routing {:?} statement with {} params", stmt.kind, params.len());

    let query = QueryContext::new(sql, stmt, params);
    let ctx = kernel.generate_execution_context(&query, &SessionState::default())?;

    if json {
        let units: Vec<UnitView<'_>> = ctx
            .units
            .iter()
            .map(|u| UnitView {
                data_source: &u.data_source,
                sql: &u.sql,
                params: &u.params,
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&units)?);
    }
    let mut out = format!(
        "route: {} ({} units)",
        ctx.route.route_type().as_str(),
        ctx.units.len()
    );
    for unit in &ctx.units {
        out.push('\n');
        out.push_str(&unit.to_string());
    }
    Ok(out)
}

pub fn print_default_config() -> Result<String> {
    Ok(KestrelConfig::sample().to_toml_string()?)
}

/// `NULL`, booleans, integers and decimals by their literal form; anything
/// else (optionally single-quoted) is text.
fn parse_param(raw: &str) -> Datum {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return Datum::Null;
    }
    if let Ok(b) = trimmed.to_ascii_lowercase().parse::<bool>() {
        return Datum::Boolean(b);
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Datum::Int64(v);
    }
    if trimmed.contains('.') {
        if let Ok(v) = trimmed.parse::<f64>() {
            return Datum::Float64(v);
        }
    }
    let text = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed);
    Datum::Text(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::statement::{
        ConditionGroup, Predicate, StatementKind, TableSegment, ValueExpr,
    };

    fn sample_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("rules.toml");
        std::fs::write(&path, print_default_config().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_parse_param() {
        assert!(parse_param("NULL").is_null());
        assert!(matches!(parse_param("true"), Datum::Boolean(true)));
        assert!(matches!(parse_param(" 42 "), Datum::Int64(42)));
        assert!(matches!(parse_param("1.5"), Datum::Float64(v) if v == 1.5));
        assert_eq!(parse_param("'abc'").as_str(), Some("abc"));
        assert_eq!(parse_param("PAID").as_str(), Some("PAID"));
    }

    #[test]
    fn test_check_sample_config() {
        let dir = tempfile::tempdir().unwrap();
        let summary = check(&sample_file(dir.path())).unwrap();
        assert!(summary.starts_with("OK: 4 data sources, 2 sharding tables"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[[data_sources]]\nname = 1\n").unwrap();
        assert!(check(&broken).is_err());
    }

    #[test]
    fn test_route_prints_units() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_file(dir.path());
        let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
        let mut stmt = BoundStatement::new(StatementKind::Select);
        stmt.tables = vec!["t_order".into()];
        stmt.table_segments = vec![TableSegment::new(14, 21, "t_order")];
        stmt.conditions = vec![ConditionGroup::new(vec![
            Predicate::eq("t_order", "user_id", ValueExpr::Parameter(0)),
            Predicate::eq("t_order", "order_id", ValueExpr::Parameter(1)),
        ])];
        let statement = dir.path().join("stmt.json");
        std::fs::write(&statement, serde_json::to_string(&stmt).unwrap()).unwrap();
        let params = vec!["1".to_string(), "3".to_string()];

        let text = route(&config, &statement, sql, &params, false).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("(1 units)"));
        assert!(lines[1].starts_with(
            "read_ds_1 ::: SELECT * FROM t_order_1 WHERE user_id = ? AND order_id = ?"
        ));

        let json = route(&config, &statement, sql, &params, true).unwrap();
        let units: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(units[0]["data_source"], "read_ds_1");

        std::fs::write(&statement, "{\"kind\": \"merge\"}").unwrap();
        assert!(route(&config, &statement, sql, &params, false).is_err());
    }
}
