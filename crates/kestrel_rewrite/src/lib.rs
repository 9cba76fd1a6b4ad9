//! Rewrite engine.
//!
//! Rewriting is token-driven: the binder reports byte spans of table names,
//! pagination values, the end of the select list and so on, and the engine
//! substitutes text at those spans per route unit. SQL is never re-parsed.

pub mod engine;
pub mod pagination;
pub mod token;

pub use engine::{ExecutionUnit, SqlRewriteEngine};
pub use pagination::PaginationContext;
pub use token::{SqlToken, TokenKind};
