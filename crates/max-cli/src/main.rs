//! # MAX CLI
//!
//! Operator tools for the MAX identity gateway.

#![forbid(unsafe_code)]
#![deny(warnings)]

use clap::Parser;
use max_cli::{Cli, commands::run, output::error};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        error(&e.to_string());
        std::process::exit(1);
    }
}
