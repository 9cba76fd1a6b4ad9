//! Rewrite engine: one execution unit per route unit.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use kestrel_common::datum::Datum;
use kestrel_common::error::{ConfigError, KestrelResult, RewriteError};
use kestrel_common::projection::ProjectionLayout;
use kestrel_common::statement::{BoundStatement, OrderDirection, PaginationValue, StatementKind};
use kestrel_route::{RouteContext, RouteUnit, ShardingRule};

use crate::pagination::PaginationContext;
use crate::token::{self, SqlToken, TokenKind};

/// Actual SQL and parameters for one data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql: String,
    pub params: Vec<Datum>,
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(Datum::to_sql_literal).collect();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqlRewriteEngine {
    rule: Arc<ShardingRule>,
}

impl SqlRewriteEngine {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self { rule }
    }

    /// Rewrite `sql` for every unit of `route`, in route order. Pure: the same
    /// inputs always produce byte-identical output.
    pub fn rewrite(
        &self,
        sql: &str,
        stmt: &BoundStatement,
        route: &RouteContext,
        params: &[Datum],
    ) -> KestrelResult<Vec<ExecutionUnit>> {
        let multi = route.units().len() > 1;
        let pagination = PaginationContext::new(stmt.pagination.as_ref(), params)?;
        let layout = ProjectionLayout::build(stmt, multi);
        let shared = if multi && stmt.kind == StatementKind::Select {
            self.query_tokens(sql, stmt, &layout, &pagination)?
        } else {
            QueryTokens::default()
        };

        let mut units = Vec::with_capacity(route.units().len());
        let mut token_count = 0usize;
        for unit in route.units() {
            let mut tokens = self.table_tokens(sql, stmt, unit)?;
            tokens.extend(shared.tokens.iter().cloned());
            let mut unit_params = params.to_vec();
            for (idx, value) in &shared.param_revisions {
                if let Some(slot) = unit_params.get_mut(*idx) {
                    *slot = value.clone();
                }
            }
            if stmt.kind == StatementKind::Insert {
                if let Some((insert_tokens, insert_params)) =
                    self.insert_tokens(sql, stmt, route, unit, params)?
                {
                    tokens.extend(insert_tokens);
                    unit_params = insert_params;
                }
            }
            token_count += tokens.len();
            let actual_sql = token::apply(sql, tokens)?;
            units.push(ExecutionUnit {
                data_source: unit.data_source.actual_name.clone(),
                sql: actual_sql,
                params: unit_params,
            });
        }
        tracing::debug!(
            units = units.len(),
            tokens = token_count,
            derived = layout.derived.len(),
            "rewrote statement"
        );
        kestrel_observability::record_rewrite(units.len(), token_count);
        Ok(units)
    }

    fn table_tokens(
        &self,
        sql: &str,
        stmt: &BoundStatement,
        unit: &RouteUnit,
    ) -> KestrelResult<Vec<SqlToken>> {
        let mut tokens = Vec::new();
        for segment in &stmt.table_segments {
            let original = sql.get(segment.start..segment.stop).ok_or(
                RewriteError::TokenOutOfBounds {
                    start: segment.start,
                    stop: segment.stop,
                    len: sql.len(),
                },
            )?;
            match unit.actual_table(&segment.name) {
                Some(actual) => {
                    if token::unquote(original) != actual {
                        tokens.push(SqlToken::replace(
                            TokenKind::Table,
                            segment.start,
                            segment.stop,
                            token::requote(original, actual),
                        ));
                    }
                }
                None if self.rule.is_known_table(&segment.name) => {}
                None => return Err(ConfigError::UnknownTable(segment.name.clone()).into()),
            }
        }
        Ok(tokens)
    }

    /// Tokens shared by every unit of a multi-shard query.
    fn query_tokens(
        &self,
        sql: &str,
        stmt: &BoundStatement,
        layout: &ProjectionLayout,
        pagination: &PaginationContext,
    ) -> KestrelResult<QueryTokens> {
        let mut shared = QueryTokens::default();
        if layout.raw_rows {
            raw_row_tokens(sql, stmt, &mut shared.tokens)?;
        }
        if !layout.derived.is_empty() {
            let at = stmt.projections.stop.ok_or(RewriteError::MissingAnchor {
                token: "projections",
            })?;
            let columns: Vec<String> = layout.derived.iter().map(|d| d.to_sql()).collect();
            shared.tokens.push(SqlToken::insert(
                TokenKind::Projections,
                at,
                format!(", {}", columns.join(", ")),
            ));
        }
        if layout.order_by_from_group_by {
            let at = stmt.group_by_stop.ok_or(RewriteError::MissingAnchor { token: "order by" })?;
            let items: Vec<String> = stmt
                .group_by
                .iter()
                .map(|item| match item.direction {
                    OrderDirection::Asc => format!("{} ASC", item.expression),
                    OrderDirection::Desc => format!("{} DESC", item.expression),
                })
                .collect();
            shared.tokens.push(SqlToken::insert(
                TokenKind::OrderBy,
                at,
                format!(" ORDER BY {}", items.join(", ")),
            ));
        }
        if pagination.has_pagination() {
            // Raw rows and memory-merged groups are limited only after merging.
            let unbounded =
                layout.raw_rows || (!layout.group_by.is_empty() && !layout.group_by_streamable());
            if let Some(segment) = pagination.offset_segment() {
                shared.revise(TokenKind::Offset, segment.start, segment.stop, segment.value, pagination.revised_offset());
            }
            if let (Some(segment), Some(count)) =
                (pagination.row_count_segment(), pagination.revised_row_count(unbounded))
            {
                shared.revise(TokenKind::RowCount, segment.start, segment.stop, segment.value, count);
            }
        }
        Ok(shared)
    }

    /// Keep only the rows routed to `unit`, each extended with its generated
    /// key. `None` when the statement needs no change for this unit.
    fn insert_tokens(
        &self,
        sql: &str,
        stmt: &BoundStatement,
        route: &RouteContext,
        unit: &RouteUnit,
        params: &[Datum],
    ) -> KestrelResult<Option<(Vec<SqlToken>, Vec<Datum>)>> {
        let Some(insert) = &stmt.insert else {
            return Ok(None);
        };
        let (Some(first), Some(last)) = (insert.rows.first(), insert.rows.last()) else {
            return Ok(None);
        };
        let rows: Vec<usize> = if route.original_data_nodes.is_empty() {
            (0..insert.rows.len()).collect()
        } else {
            route.insert_rows_for(unit)
        };
        let generated = route.generated_keys.as_ref();
        if generated.is_none() && rows.len() == insert.rows.len() {
            return Ok(None);
        }

        let mut tokens = Vec::new();
        if let Some(keys) = generated {
            let at = insert.columns_stop.ok_or(RewriteError::MissingAnchor {
                token: "generated key column",
            })?;
            tokens.push(SqlToken::insert(
                TokenKind::GeneratedKeyColumn,
                at,
                format!(", {}", keys.column),
            ));
        }

        let mut values = Vec::with_capacity(rows.len());
        for &i in &rows {
            let row = &insert.rows[i];
            let text = sql.get(row.start..row.stop).ok_or(RewriteError::TokenOutOfBounds {
                start: row.start,
                stop: row.stop,
                len: sql.len(),
            })?;
            match generated.and_then(|keys| keys.values.get(i)) {
                Some(key) => {
                    let body = text.strip_suffix(')').ok_or(RewriteError::MissingAnchor {
                        token: "insert values",
                    })?;
                    values.push(format!("{body}, {})", key.to_sql_literal()));
                }
                None => values.push(text.to_string()),
            }
        }
        tokens.push(SqlToken::replace(
            TokenKind::InsertValues,
            first.start,
            last.stop,
            values.join(", "),
        ));

        // Positional parameters follow their rows; parameters outside the
        // value rows are kept.
        let row_params: BTreeSet<usize> = insert
            .rows
            .iter()
            .flat_map(|r| r.values.iter().filter_map(|v| v.parameter_index()))
            .collect();
        let kept: BTreeSet<usize> = rows
            .iter()
            .flat_map(|&i| insert.rows[i].values.iter().filter_map(|v| v.parameter_index()))
            .collect();
        let unit_params = params
            .iter()
            .enumerate()
            .filter(|(idx, _)| !row_params.contains(idx) || kept.contains(idx))
            .map(|(_, p)| p.clone())
            .collect();
        Ok(Some((tokens, unit_params)))
    }
}

/// Turn an aggregate query into a raw-row query: every aggregate call becomes
/// its argument and the GROUP BY and ORDER BY clauses go.
fn raw_row_tokens(
    sql: &str,
    stmt: &BoundStatement,
    tokens: &mut Vec<SqlToken>,
) -> KestrelResult<()> {
    for agg in &stmt.projections.aggregations {
        let span = agg.span.ok_or(RewriteError::MissingAnchor { token: "aggregation" })?;
        tokens.push(SqlToken::replace(
            TokenKind::Aggregation,
            span.start,
            span.stop,
            agg.raw_expression(),
        ));
    }
    if !stmt.group_by.is_empty() {
        let (Some(start), Some(stop)) = (stmt.group_by_start, stmt.group_by_stop) else {
            return Err(RewriteError::MissingAnchor { token: "group by" }.into());
        };
        tokens.push(remove_clause(sql, TokenKind::GroupBy, start, stop));
    }
    if !stmt.order_by.is_empty() {
        let span = stmt.order_by_span.ok_or(RewriteError::MissingAnchor { token: "order by" })?;
        tokens.push(remove_clause(sql, TokenKind::OrderBy, span.start, span.stop));
    }
    Ok(())
}

/// Remove `[start, stop)` together with the whitespace before it.
fn remove_clause(sql: &str, kind: TokenKind, start: usize, stop: usize) -> SqlToken {
    let start = sql
        .get(..start)
        .map_or(start, |head| head.trim_end().len());
    SqlToken::replace(kind, start, stop, "")
}

#[derive(Debug, Default)]
struct QueryTokens {
    tokens: Vec<SqlToken>,
    /// Parameter-bound pagination values: keep the `?`, revise the value.
    param_revisions: Vec<(usize, Datum)>,
}

impl QueryTokens {
    fn revise(&mut self, kind: TokenKind, start: usize, stop: usize, value: PaginationValue, revised: u64) {
        match value {
            PaginationValue::Literal(_) => {
                self.tokens
                    .push(SqlToken::replace(kind, start, stop, revised.to_string()));
            }
            PaginationValue::Parameter(idx) => {
                let revised = i64::try_from(revised).unwrap_or(i64::MAX);
                self.param_revisions.push((idx, Datum::Int64(revised)));
            }
        }
    }
}
