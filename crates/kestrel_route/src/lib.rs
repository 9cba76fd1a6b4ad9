//! Route engine.
//!
//! Turns a bound statement into a [`RouteContext`]: the set of
//! (data source, actual tables) units it must execute on. Routing is a pure
//! function of the statement, its parameters, explicit hints, the session's
//! transaction state and a snapshot of disabled data sources.

pub mod condition;
pub mod context;
pub mod engine;
pub mod hint;
pub mod readwrite;
pub mod rule;
pub mod strategy;
pub mod validator;

pub use condition::{ShardingCondition, ShardingConditions};
pub use context::{GeneratedKeys, RouteContext, RouteMapper, RouteType, RouteUnit};
pub use engine::RouteEngine;
pub use hint::HintValues;
pub use readwrite::{
    DataSourceStateRegistry, DisabledDataSources, ReadwriteSplittingRule, SessionState,
};
pub use rule::{ShardingRule, TableRule};
pub use strategy::ShardingStrategy;
