use thiserror::Error;

/// Convenience alias for `Result<T, KestrelError>`.
pub type KestrelResult<T> = Result<T, KestrelError>;

/// Error classification for escalation decisions.
///
/// - `Configuration`: rule/algorithm/topology problems; fatal, never retried
/// - `UserError`    : statement shapes the middleware refuses (bad parameters, unsupported updates)
/// - `MergeSemantic`: shard results that violate merge assumptions (e.g. unsorted streams)
/// - `Resource`     : a configured buffer limit was exceeded
/// - `Execution`    : a failure reported by the execution boundary for one shard
/// - `InternalBug`  : should never happen; triggers alert + diagnostic log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UserError,
    MergeSemantic,
    Resource,
    Execution,
    InternalBug,
}

/// Top-level error type that all layer errors convert into.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Rule, algorithm and topology errors. Raised at rule build time or when a
/// route/rewrite step finds the configuration cannot serve a statement.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid data node '{0}': expected <data_source>.<table>")]
    InvalidDataNode(String),

    #[error("Table '{table}' references data source '{data_source}' which is not in the topology")]
    UnknownDataSource { table: String, data_source: String },

    #[error("No {kind} algorithm registered for type '{type_name}'")]
    AlgorithmTypeNotFound {
        kind: &'static str,
        type_name: String,
    },

    #[error("Algorithm '{0}' is not defined")]
    AlgorithmNotDefined(String),

    #[error("Invalid property '{key}' for algorithm '{algorithm}': {reason}")]
    InvalidProperty {
        algorithm: String,
        key: String,
        reason: String,
    },

    #[error("Algorithm '{0}' cannot route range conditions")]
    RangeNotSupported(String),

    #[error("Table '{0}' is not known to any rule")]
    UnknownTable(String),

    #[error("Invalid inline expression '{expression}': {reason}")]
    InvalidInlineExpression { expression: String, reason: String },

    #[error("Invalid binding table group {tables:?}: {reason}")]
    InvalidBindingGroup { tables: Vec<String>, reason: String },

    #[error("Read-write splitting group '{group}' is invalid: {reason}")]
    InvalidReadwriteGroup { group: String, reason: String },

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("Algorithm '{algorithm}' routed to '{target}', which is not an available target")]
    TargetNotFound { algorithm: String, target: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Route-time errors caused by the statement rather than the rule.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Unsupported statement: {0}")]
    Unsupported(String),

    #[error("Parameter at index {0} not provided")]
    ParameterMissing(usize),

    #[error("Insert into '{table}' has no value for sharding column '{column}'")]
    MissingShardingValue { table: String, column: String },

    #[error("Invalid sharding condition: {0}")]
    InvalidCondition(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// Rewrite errors: tokens supplied by the binder that cannot be applied.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Token span [{start}, {stop}) is outside SQL of length {len}")]
    TokenOutOfBounds { start: usize, stop: usize, len: usize },

    #[error("Token span [{start}, {stop}) overlaps a previous token ending at {previous_stop}")]
    OverlappingTokens {
        start: usize,
        stop: usize,
        previous_stop: usize,
    },

    #[error("Token span [{start}, {stop}) does not fall on character boundaries")]
    NotCharBoundary { start: usize, stop: usize },

    #[error("Statement needs a {token} token but carries no position for it")]
    MissingAnchor { token: &'static str },
}

/// Merge-phase errors.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Stream {stream} is not sorted by the ORDER BY items (row {row} sorts before its predecessor)")]
    UnsortedStream { stream: usize, row: u64 },

    #[error("Column index out of bounds: {index} (row has {width} columns)")]
    ColumnOutOfBounds { index: usize, width: usize },

    #[error("Cannot {op} values of type {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Column {index} holds a {actual} value, expected {expected}")]
    UnexpectedType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No current row: next() was not called or returned false")]
    NoCurrentRow,

    #[error("Memory merge aborted: {rows} rows exceeds max_rows_buffered limit of {limit}")]
    RowLimitExceeded { rows: usize, limit: usize },
}

/// Failures surfaced by the execution boundary.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Data source '{data_source}' failed: {reason}")]
    Failed {
        data_source: String,
        reason: String,
        retryable: bool,
    },

    #[error("{failed} of {total} execution units failed: {details}")]
    Partial {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("Execution unit for '{0}' panicked")]
    Panicked(String),
}

// ── KestrelError classification & helpers ────────────────────────────────────

impl KestrelError {
    /// Classify this error for escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KestrelError::Config(_) => ErrorKind::Configuration,

            KestrelError::Route(RouteError::Unsupported(_)) => ErrorKind::UserError,
            KestrelError::Route(RouteError::ParameterMissing(_)) => ErrorKind::UserError,
            KestrelError::Route(RouteError::MissingShardingValue { .. }) => ErrorKind::UserError,
            KestrelError::Route(RouteError::InvalidCondition(_)) => ErrorKind::UserError,
            KestrelError::Route(RouteError::KeyGeneration(_)) => ErrorKind::InternalBug,

            KestrelError::Merge(MergeError::RowLimitExceeded { .. }) => ErrorKind::Resource,
            KestrelError::Merge(_) => ErrorKind::MergeSemantic,

            KestrelError::Execution(_) => ErrorKind::Execution,

            // Bad token spans mean the binder handed us an inconsistent statement.
            KestrelError::Rewrite(_) => ErrorKind::InternalBug,
        }
    }

    /// Only shard failures explicitly marked retryable by the boundary are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KestrelError::Execution(ExecutionError::Failed { retryable: true, .. })
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Pipeline stage the error came from.
    pub fn stage(&self) -> &'static str {
        match self {
            KestrelError::Config(_) => "config",
            KestrelError::Route(_) => "route",
            KestrelError::Rewrite(_) => "rewrite",
            KestrelError::Merge(_) => "merge",
            KestrelError::Execution(_) => "execution",
        }
    }

    /// Log internal bugs at error level with the SQL that triggered them.
    /// Returns whether anything was logged.
    pub fn log_if_fatal(&self, sql: &str) -> bool {
        if !self.is_internal_bug() {
            return false;
        }
        tracing::error!(
            error_category = "Fatal",
            stage = self.stage(),
            sql,
            "internal bug: {}",
            self
        );
        true
    }
}
