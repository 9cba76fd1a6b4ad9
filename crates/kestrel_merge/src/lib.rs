//! Merge engine.
//!
//! Turns the raw results of every execution unit into one forward-only
//! cursor. Mergers are layered by composition: a base union over the raw
//! streams (iterator or ordered k-way), optionally grouped, then wrapped by
//! the distinct and pagination decorators.

pub mod compare;
pub mod context;
pub mod decorator;
pub mod engine;
pub mod group_by;
pub mod result;
pub mod stream;

pub use compare::compare_rows;
pub use context::MergeContext;
pub use engine::{MergeEngine, MergeStrategy};
pub use result::{collect_rows, MemoryQueryResult, MergedResult, QueryResult, StreamQueryResult};
