//! Kestrel kernel.
//!
//! Drives one statement through the pipeline: route, rewrite, execute every
//! unit through an [`ExecutionBoundary`] supplied by the embedding proxy,
//! then merge the raw results into a single cursor.

pub mod boundary;
pub mod context;
pub mod processor;

pub use boundary::{ExecutionBoundary, FallbackResultProvider, HealthCheckFallback};
pub use context::{ExecutionContext, QueryContext};
pub use processor::KernelProcessor;
