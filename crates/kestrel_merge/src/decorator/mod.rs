//! Decorators wrapping an inner merged result.

pub mod distinct;
pub mod pagination;

pub use distinct::DistinctMergedResult;
pub use pagination::PaginationMergedResult;
