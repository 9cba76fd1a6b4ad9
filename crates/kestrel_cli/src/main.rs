mod args;
mod commands;

use std::process;

use anyhow::Result;
use args::{Args, Command};
use clap::Parser;

fn main() {
    if let Err(e) = run() {
        eprintln!("kestrel: error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    kestrel_observability::init_tracing("warn");

    let args = Args::parse();
    let output = match args.command {
        Command::Check { config } => commands::check(&config)?,
        Command::Route {
            config,
            statement,
            sql,
            params,
            json,
        } => commands::route(&config, &statement, &sql, &params, json)?,
        Command::PrintDefaultConfig => commands::print_default_config()?,
    };
    println!("{}", output);
    Ok(())
}
