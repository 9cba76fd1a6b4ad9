//! Base unions over raw shard streams.

pub mod iterator;
pub mod order_by;
pub mod transparent;

pub use iterator::IteratorStreamMergedResult;
pub use order_by::OrderByStreamMergedResult;
pub use transparent::TransparentMergedResult;
