use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// kestrel: inspect sharding rule files offline
#[derive(Debug, Parser)]
#[command(name = "kestrel", about = "Kestrel sharding rule tooling", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a rule file and build every algorithm it names
    Check {
        /// Rule file (TOML)
        #[arg(short, long, env = "KESTREL_CONFIG")]
        config: PathBuf,
    },

    /// Route and rewrite one bound statement, printing the execution units
    Route {
        /// Rule file (TOML)
        #[arg(short, long, env = "KESTREL_CONFIG")]
        config: PathBuf,

        /// Bound statement (JSON) as produced by the binder
        #[arg(short, long)]
        statement: PathBuf,

        /// Logical SQL the statement was bound from
        #[arg(long)]
        sql: String,

        /// Positional parameter, repeatable (e.g. --param 42 --param 'abc')
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,

        /// Print units as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a sample rule file
    PrintDefaultConfig,
}
