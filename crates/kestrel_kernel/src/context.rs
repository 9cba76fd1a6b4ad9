use kestrel_common::datum::Datum;
use kestrel_common::statement::BoundStatement;
use kestrel_merge::MergeContext;
use kestrel_rewrite::ExecutionUnit;
use kestrel_route::{HintValues, RouteContext};

/// One logical statement as the proxy received it.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub sql: String,
    pub stmt: BoundStatement,
    pub params: Vec<Datum>,
    pub hints: HintValues,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, stmt: BoundStatement, params: Vec<Datum>) -> Self {
        Self {
            sql: sql.into(),
            stmt,
            params,
            hints: HintValues::default(),
        }
    }

    pub fn with_hints(mut self, hints: HintValues) -> Self {
        self.hints = hints;
        self
    }
}

/// Route decision, rewritten units and merge plan for one statement.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub route: RouteContext,
    pub units: Vec<ExecutionUnit>,
    pub merge: MergeContext,
}
