//! Kernel processor: the per-statement pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use kestrel_algorithm::AlgorithmRegistry;
use kestrel_common::config::{KernelProps, KestrelConfig};
use kestrel_common::error::{ExecutionError, KestrelError, KestrelResult};
use kestrel_common::projection::ProjectionLayout;
use kestrel_common::statement::StatementKind;
use kestrel_merge::{MergeContext, MergeEngine, MergedResult, QueryResult};
use kestrel_rewrite::{ExecutionUnit, PaginationContext, SqlRewriteEngine};
use kestrel_route::{
    DataSourceStateRegistry, ReadwriteSplittingRule, RouteEngine, SessionState, ShardingRule,
};

use crate::boundary::{ExecutionBoundary, FallbackResultProvider};
use crate::context::{ExecutionContext, QueryContext};

/// Immutable after construction; share one instance across sessions.
pub struct KernelProcessor {
    props: KernelProps,
    router: RouteEngine,
    rewriter: SqlRewriteEngine,
    merger: MergeEngine,
    states: Arc<DataSourceStateRegistry>,
    fallback: Option<Arc<dyn FallbackResultProvider>>,
}

impl KernelProcessor {
    /// Build the rules from `config`, resolving every algorithm through
    /// `registry`. Any configuration problem fails here, not per statement.
    pub fn new(config: &KestrelConfig, registry: &AlgorithmRegistry) -> KestrelResult<Self> {
        let sharding = Arc::new(ShardingRule::new(config, registry)?);
        let readwrite = Arc::new(ReadwriteSplittingRule::new(config, registry)?);
        tracing::info!(
            tables = sharding.table_rules().count(),
            data_sources = sharding.data_source_names().len(),
            readwrite_groups = !readwrite.is_empty(),
            "kernel rules built"
        );
        Ok(Self {
            props: config.props.clone(),
            router: RouteEngine::new(Arc::clone(&sharding), readwrite),
            rewriter: SqlRewriteEngine::new(sharding),
            merger: MergeEngine::new(),
            states: Arc::new(DataSourceStateRegistry::new()),
            fallback: None,
        })
    }

    pub fn from_config_file(
        path: impl AsRef<Path>,
        registry: &AlgorithmRegistry,
    ) -> KestrelResult<Self> {
        let config = KestrelConfig::load(path)?;
        Self::new(&config, registry)
    }

    /// Share a data-source state registry with a health checker or another
    /// processor.
    pub fn with_state_registry(mut self, states: Arc<DataSourceStateRegistry>) -> Self {
        self.states = states;
        self
    }

    pub fn with_fallback(mut self, provider: Arc<dyn FallbackResultProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn state_registry(&self) -> &Arc<DataSourceStateRegistry> {
        &self.states
    }

    pub fn props(&self) -> &KernelProps {
        &self.props
    }

    pub fn route_engine(&self) -> &RouteEngine {
        &self.router
    }

    /// Route and rewrite `query`. Reads one snapshot of the disabled data
    /// sources; state changes made meanwhile apply to the next statement.
    pub fn generate_execution_context(
        &self,
        query: &QueryContext,
        session: &SessionState,
    ) -> KestrelResult<ExecutionContext> {
        let disabled = self.states.snapshot();
        let route = self
            .router
            .route(&query.stmt, &query.params, &query.hints, session, &disabled)?;
        let units = self
            .rewriter
            .rewrite(&query.sql, &query.stmt, &route, &query.params)?;

        let multi = route.units().len() > 1;
        let mut merge = MergeContext::new(&query.stmt, ProjectionLayout::build(&query.stmt, multi))
            .with_max_rows_buffered(self.props.max_rows_buffered);
        if multi {
            let pagination = PaginationContext::new(query.stmt.pagination.as_ref(), &query.params)?;
            merge = merge.with_pagination(pagination.actual_offset(), pagination.actual_row_count());
        }

        if self.props.sql_show {
            tracing::info!("Logic SQL: {}", query.sql);
            for unit in &units {
                tracing::info!("Actual SQL: {}", unit);
            }
        }
        Ok(ExecutionContext {
            route,
            units,
            merge,
        })
    }

    /// Run `query` end to end and return the merged cursor.
    ///
    /// All-or-nothing: when any unit fails every stream already obtained is
    /// dropped and the error is returned, unless a fallback provider answers
    /// in its place.
    pub fn execute_query(
        &self,
        query: &QueryContext,
        session: &mut SessionState,
        boundary: &dyn ExecutionBoundary,
    ) -> KestrelResult<Box<dyn MergedResult>> {
        let start = Instant::now();
        let result = self.run(query, session, boundary);
        if let Err(e) = &result {
            e.log_if_fatal(&query.sql);
        }
        kestrel_observability::record_statement_duration_us(
            start.elapsed().as_micros() as u64,
            query.stmt.kind.as_str(),
            result.is_ok(),
        );
        result
    }

    fn run(
        &self,
        query: &QueryContext,
        session: &mut SessionState,
        boundary: &dyn ExecutionBoundary,
    ) -> KestrelResult<Box<dyn MergedResult>> {
        let ctx = self.generate_execution_context(query, session)?;
        let streams = match dispatch(&ctx.units, boundary) {
            Ok(streams) => streams,
            Err(e) => return self.fall_back(query, e),
        };
        if writes(query) {
            session.note_write();
        }
        let stream_count = streams.len();
        let merged = self.merger.merge(streams, &ctx.merge)?;
        kestrel_observability::record_merge(
            MergeEngine::strategy(&ctx.merge, stream_count).as_str(),
            stream_count,
        );
        Ok(merged)
    }

    fn fall_back(
        &self,
        query: &QueryContext,
        error: KestrelError,
    ) -> KestrelResult<Box<dyn MergedResult>> {
        match self.fallback.as_ref().and_then(|p| p.fallback(query, &error)) {
            Some(result) => {
                tracing::warn!(error = %error, "execution failed, serving fallback result");
                Ok(result)
            }
            None => Err(error),
        }
    }
}

/// Statements that make later reads in the same transaction pin to the
/// write data source.
fn writes(query: &QueryContext) -> bool {
    !query.stmt.is_read_only()
        && !matches!(
            query.stmt.kind,
            StatementKind::Tcl | StatementKind::Set | StatementKind::Use | StatementKind::Show
        )
}

/// Execute every unit, in parallel when there is more than one. Results come
/// back in unit order.
fn dispatch(
    units: &[ExecutionUnit],
    boundary: &dyn ExecutionBoundary,
) -> KestrelResult<Vec<Box<dyn QueryResult>>> {
    let total = units.len();
    let outcomes: Vec<KestrelResult<Box<dyn QueryResult>>> = if total <= 1 {
        units.iter().map(|unit| boundary.execute(unit)).collect()
    } else {
        std::thread::scope(|s| {
            let handles: Vec<_> = units
                .iter()
                .map(|unit| s.spawn(move || boundary.execute(unit)))
                .collect();
            handles
                .into_iter()
                .zip(units)
                .map(|(h, unit)| {
                    h.join().unwrap_or_else(|_| {
                        Err(ExecutionError::Panicked(unit.data_source.clone()).into())
                    })
                })
                .collect()
        })
    };

    let mut streams = Vec::with_capacity(total);
    let mut failures: Vec<(&str, KestrelError)> = Vec::new();
    for (unit, outcome) in units.iter().zip(outcomes) {
        match outcome {
            Ok(stream) => streams.push(stream),
            Err(e) => {
                tracing::warn!(data_source = %unit.data_source, error = %e, "execution unit failed");
                failures.push((unit.data_source.as_str(), e));
            }
        }
    }
    kestrel_observability::record_execution(total, failures.len());
    if failures.is_empty() {
        return Ok(streams);
    }
    drop(streams);

    let failed = failures.len();
    let details = failures
        .iter()
        .map(|(ds, e)| format!("{ds}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    match failures.pop() {
        // A lone failure keeps its own classification.
        Some((_, err)) if failed == 1 => Err(err),
        _ => Err(ExecutionError::Partial {
            failed,
            total,
            details,
        }
        .into()),
    }
}
