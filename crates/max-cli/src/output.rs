//! Output formatting utilities.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Renders rows as a rounded table.
#[must_use]
pub fn table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Outputs rows in the requested format.
///
/// # Errors
///
/// Fails when the rows cannot be serialized to JSON.
pub fn output<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                info("Nothing to show.");
            } else {
                println!("{}", table(rows));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

