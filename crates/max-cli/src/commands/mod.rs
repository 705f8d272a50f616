//! Command implementations.

pub mod config;
pub mod token;

pub use config::{run_check_config, run_setup_config, run_validate_config};
pub use token::run_gen_token;

use crate::cli::{Cli, Command};

/// Runs the parsed command line.
///
/// # Errors
///
/// Returns the error of the command that ran.
pub fn run(cli: Cli) -> crate::CliResult<()> {
    tracing::debug!(command = ?cli.command, "running command");
    match cli.command {
        Command::SetupConfig { root } => run_setup_config(&root, cli.output),
        Command::CheckConfig { root } => run_check_config(&root, cli.output),
        Command::ValidateConfig { config } => run_validate_config(&config, cli.output),
        Command::GenToken { length, hex } => run_gen_token(length, hex),
    }
}
