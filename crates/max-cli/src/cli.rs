//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// MAX - tools for operating the MAX identity gateway.
#[derive(Debug, Parser)]
#[command(name = "max")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable table.
    #[default]
    Table,
    /// JSON.
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create missing configuration files from their `.example` templates.
    SetupConfig {
        /// Directory holding the configuration files.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Show which configuration files and templates are present.
    CheckConfig {
        /// Directory holding the configuration files.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Load and validate a configuration file.
    ValidateConfig {
        /// Configuration file.
        #[arg(long, env = "MAX_CONFIG", default_value = "max.conf")]
        config: PathBuf,
    },

    /// Print a random token.
    GenToken {
        /// Number of characters (alphanumeric) or bytes (hex).
        #[arg(long, default_value_t = max_crypto::random::TOKEN_LENGTH)]
        length: usize,

        /// Print hex encoded random bytes instead, e.g. `--hex --length 32`
        /// for `redis.encryption_key`.
        #[arg(long)]
        hex: bool,
    },
}
