//! # max-core
//!
//! Configuration, configuration bootstrapping, and shared error handling for
//! the MAX identity gateway.
//!
//! ## Modules
//!
//! - [`bootstrap`] - Copies example configuration files into place
//! - [`config`] - `max.conf` model, loading, and validation
//! - [`error`] - Shared error type

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod error;

pub use bootstrap::{
    BootstrapReport, ConfigStatus, FileOutcome, TRACKED_PATHS, check_config, setup_config,
};
pub use config::MaxConfig;
pub use error::{Error, Result};
