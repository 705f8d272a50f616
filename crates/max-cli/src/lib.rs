//! # max-cli
//!
//! Operator tools for the MAX identity gateway:
//! - bootstrapping configuration files from their `.example` templates
//! - reporting which configuration files are present
//! - validating `max.conf` and the files it references
//! - generating tokens and encryption keys

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use error::{CliError, CliResult};
