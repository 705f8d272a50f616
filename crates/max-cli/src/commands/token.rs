//! Token generation.

use std::fmt::Write as _;

use max_crypto::{random_alphanumeric, random_bytes};

use crate::CliError;

/// Prints a random token.
///
/// # Errors
///
/// Rejects a zero length.
pub fn run_gen_token(length: usize, hex: bool) -> crate::CliResult<()> {
    println!("{}", gen_token(length, hex)?);
    Ok(())
}

fn gen_token(length: usize, hex: bool) -> crate::CliResult<String> {
    if length == 0 {
        return Err(CliError::InvalidArgument("length must be at least 1".to_string()));
    }
    if !hex {
        return Ok(random_alphanumeric(length));
    }
    Ok(random_bytes(length)
        .iter()
        .fold(String::with_capacity(length * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        }))
}
