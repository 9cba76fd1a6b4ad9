//! Bound statement model.
//!
//! A `BoundStatement` is what the upstream parser/binder hands to Kestrel: the
//! statement kind, the logical tables it touches, predicate conditions on
//! columns, select-list facts the merger needs, and byte spans of every piece
//! of SQL text the rewriter may replace. Spans are half-open `[start, stop)`
//! byte offsets into the original SQL.

use serde::{Deserialize, Serialize};

use crate::datum::Datum;
use crate::error::{KestrelResult, RouteError};
use crate::types::Dialect;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    /// CREATE / ALTER / DROP / TRUNCATE and friends.
    Ddl,
    /// GRANT / REVOKE / CREATE USER.
    Dcl,
    /// BEGIN / COMMIT / ROLLBACK / SAVEPOINT.
    Tcl,
    /// Session variables: SET ...
    Set,
    /// USE <schema>: handled by the proxy session, nothing to send.
    Use,
    /// SHOW / DESCRIBE / EXPLAIN style introspection.
    Show,
}

impl StatementKind {
    pub fn is_dml(self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub fn is_query(self) -> bool {
        matches!(self, StatementKind::Select)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Ddl => "ddl",
            StatementKind::Dcl => "dcl",
            StatementKind::Tcl => "tcl",
            StatementKind::Set => "set",
            StatementKind::Use => "use",
            StatementKind::Show => "show",
        }
    }
}

/// A literal or a positional parameter marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    Literal(Datum),
    Parameter(usize),
}

impl ValueExpr {
    pub fn resolve(&self, params: &[Datum]) -> KestrelResult<Datum> {
        match self {
            ValueExpr::Literal(d) => Ok(d.clone()),
            ValueExpr::Parameter(idx) => params
                .get(*idx)
                .cloned()
                .ok_or_else(|| RouteError::ParameterMissing(*idx).into()),
        }
    }

    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            ValueExpr::Parameter(idx) => Some(*idx),
            ValueExpr::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    pub value: ValueExpr,
    pub inclusive: bool,
}

/// Comparison of a column against values. `BETWEEN a AND b` is a range with
/// two inclusive bounds; `col < x` a range with an exclusive upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    Eq(ValueExpr),
    In(Vec<ValueExpr>),
    Range {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub table: String,
    pub column: String,
    pub op: PredicateOp,
}

impl Predicate {
    pub fn eq(table: &str, column: &str, value: ValueExpr) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            op: PredicateOp::Eq(value),
        }
    }

    pub fn in_list(table: &str, column: &str, values: Vec<ValueExpr>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            op: PredicateOp::In(values),
        }
    }

    pub fn range(
        table: &str,
        column: &str,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    ) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            op: PredicateOp::Range { lower, upper },
        }
    }
}

/// Predicates joined by AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub predicates: Vec<Predicate>,
}

impl ConditionGroup {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY or GROUP BY item.
///
/// `index` is the 0-based projection column carrying the key; `None` means the
/// expression is not in the select list and must be derived when the statement
/// runs on several shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub index: Option<usize>,
    pub expression: String,
    #[serde(default)]
    pub direction: OrderDirection,
    #[serde(default)]
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn column(index: usize, expression: &str, direction: OrderDirection) -> Self {
        Self {
            index: Some(index),
            expression: expression.to_string(),
            direction,
            nulls: None,
        }
    }

    pub fn derived(expression: &str, direction: OrderDirection) -> Self {
        Self {
            index: None,
            expression: expression.to_string(),
            direction,
            nulls: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

/// Byte range `[start, stop)` of the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
}

impl Span {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }
}

/// An aggregate function in the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationProjection {
    pub kind: AggregationKind,
    /// Projection column holding the aggregate.
    pub index: usize,
    /// Argument text without `DISTINCT`, e.g. `price` for `AVG(price)`.
    pub argument: String,
    #[serde(default)]
    pub distinct: bool,
    /// False when the function cannot run on the shards (a custom
    /// aggregate): shards then return raw argument values and the merger
    /// computes the function itself.
    #[serde(default = "default_true")]
    pub pushed_down: bool,
    /// The whole call, e.g. `COUNT(DISTINCT user_id)`.
    #[serde(default)]
    pub span: Option<Span>,
}

impl AggregationProjection {
    pub fn new(kind: AggregationKind, index: usize, argument: &str) -> Self {
        Self {
            kind,
            index,
            argument: argument.to_string(),
            distinct: false,
            pushed_down: true,
            span: None,
        }
    }

    pub fn at(mut self, start: usize, stop: usize) -> Self {
        self.span = Some(Span::new(start, stop));
        self
    }

    /// Expression a shard selects in place of the call when it has to return
    /// raw rows. `COUNT(*)` counts rows, so it becomes a constant.
    pub fn raw_expression(&self) -> &str {
        if self.argument.trim() == "*" {
            "1"
        } else {
            &self.argument
        }
    }

    /// Whether the merger computes this aggregate from raw per-row values.
    pub fn computed_centrally(&self) -> bool {
        self.distinct || !self.pushed_down
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projections {
    /// Number of columns the client sees.
    pub column_count: usize,
    #[serde(default)]
    pub aggregations: Vec<AggregationProjection>,
    /// `SELECT DISTINCT`.
    #[serde(default)]
    pub distinct_row: bool,
    /// Byte offset just past the last select item, where derived columns go.
    #[serde(default)]
    pub stop: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationValue {
    Literal(u64),
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSegment {
    pub start: usize,
    pub stop: usize,
    pub value: PaginationValue,
    /// Row-number style only: `ROWNUM > x` / `ROWNUM < y` are open bounds,
    /// `>=` / `<=` closed.
    #[serde(default)]
    pub bound_opened: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    /// `LIMIT n OFFSET m` / `LIMIT m, n`: the row count is a number of rows.
    #[default]
    Limit,
    /// `ROWNUM` / `ROW_NUMBER()` / `TOP` bounds: the row count is an upper row
    /// number.
    RowNumber,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub style: PaginationStyle,
    #[serde(default)]
    pub offset: Option<PaginationSegment>,
    #[serde(default)]
    pub row_count: Option<PaginationSegment>,
}

/// Where a logical table name appears in the SQL text. The span covers the
/// identifier including any quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSegment {
    pub start: usize,
    pub stop: usize,
    pub name: String,
}

impl TableSegment {
    pub fn new(start: usize, stop: usize, name: &str) -> Self {
        Self {
            start,
            stop,
            name: name.to_string(),
        }
    }
}

/// One parenthesised VALUES row of an INSERT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRow {
    pub start: usize,
    pub stop: usize,
    pub values: Vec<ValueExpr>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertSegment {
    pub table: String,
    /// Explicit column list, in order.
    pub columns: Vec<String>,
    /// Byte offset of the `)` closing the column list.
    #[serde(default)]
    pub columns_stop: Option<usize>,
    pub rows: Vec<InsertRow>,
}

impl InsertSegment {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }
}

/// A statement as bound by the upstream parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStatement {
    pub kind: StatementKind,
    #[serde(default)]
    pub dialect: Dialect,
    /// Distinct logical tables referenced, in order of appearance.
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub table_segments: Vec<TableSegment>,
    /// Conjunction groups joined by OR. Empty when there is no WHERE clause or
    /// no predicate the binder could extract.
    #[serde(default)]
    pub conditions: Vec<ConditionGroup>,
    #[serde(default)]
    pub projections: Projections,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    /// The ORDER BY clause, keyword included.
    #[serde(default)]
    pub order_by_span: Option<Span>,
    #[serde(default)]
    pub group_by: Vec<OrderByItem>,
    /// Byte offset of the GROUP BY keyword.
    #[serde(default)]
    pub group_by_start: Option<usize>,
    /// Byte offset just past the GROUP BY clause, where an ORDER BY can be
    /// appended.
    #[serde(default)]
    pub group_by_stop: Option<usize>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub insert: Option<InsertSegment>,
    /// Columns assigned by an UPDATE.
    #[serde(default)]
    pub assignments: Vec<String>,
    /// `SELECT ... FOR UPDATE` / `LOCK IN SHARE MODE`.
    #[serde(default)]
    pub lock: bool,
    /// Tableless statements that must reach every data source. Introspection
    /// statements answerable by any one data source set this to false.
    #[serde(default = "default_true")]
    pub requires_broadcast: bool,
}

impl Default for BoundStatement {
    fn default() -> Self {
        Self::new(StatementKind::Select)
    }
}

impl BoundStatement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            dialect: Dialect::default(),
            tables: Vec::new(),
            table_segments: Vec::new(),
            conditions: Vec::new(),
            projections: Projections::default(),
            order_by: Vec::new(),
            order_by_span: None,
            group_by: Vec::new(),
            group_by_start: None,
            group_by_stop: None,
            pagination: None,
            insert: None,
            assignments: Vec::new(),
            lock: false,
            requires_broadcast: true,
        }
    }

    /// Read-only: a SELECT without a locking clause.
    pub fn is_read_only(&self) -> bool {
        self.kind == StatementKind::Select && !self.lock
    }

    pub fn has_aggregations(&self) -> bool {
        !self.projections.aggregations.is_empty()
    }
}
