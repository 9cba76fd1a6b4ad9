pub mod config;
pub mod datum;
pub mod error;
pub mod inline;
pub mod projection;
pub mod props;
pub mod statement;
pub mod types;
