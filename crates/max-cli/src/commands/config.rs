//! Configuration commands.

use std::path::Path;

use max_core::{FileOutcome, MaxConfig, check_config, setup_config};
use serde::Serialize;
use tabled::Tabled;

use crate::CliError;
use crate::cli::OutputFormat;
use crate::output::{error, info, output, success, warning};

/// Row of the `check-config` table.
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    /// Tracked path.
    #[tabled(rename = "Path")]
    pub path: String,
    /// Whether the file exists.
    #[tabled(rename = "Present")]
    pub present: &'static str,
    /// Whether the `.example` template exists.
    #[tabled(rename = "Template")]
    pub template: &'static str,
}

/// Outcome of a single `validate-config` check.
#[derive(Debug, Serialize, Tabled)]
pub struct CheckRow {
    /// What was checked.
    #[tabled(rename = "Check")]
    pub check: String,
    /// Problem found, or `ok`.
    #[tabled(rename = "Result")]
    pub result: String,
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Creates missing configuration files from their templates.
///
/// # Errors
///
/// Fails on the first file whose template is missing.
pub fn run_setup_config(root: &Path, format: OutputFormat) -> crate::CliResult<()> {
    let report = setup_config(root).map_err(|e| CliError::Config(format!("{e:#}")))?;

    if format == OutputFormat::Json {
        let entries: Vec<_> = report
            .entries
            .iter()
            .map(|(path, outcome)| {
                serde_json::json!({
                    "path": path,
                    "created": *outcome == FileOutcome::Created,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (path, outcome) in &report.entries {
        match outcome {
            FileOutcome::Created => success(&format!("created {path}")),
            FileOutcome::Kept => info(&format!("{path} already exists")),
        }
    }
    Ok(())
}

/// Shows which configuration files and templates exist.
///
/// # Errors
///
/// Fails only when JSON output cannot be written.
pub fn run_check_config(root: &Path, format: OutputFormat) -> crate::CliResult<()> {
    let rows = config_rows(root);
    output(&rows, format)?;
    if format == OutputFormat::Table && rows.iter().any(|row| row.present == "no") {
        warning(&format!(
            "missing files can be created with `max setup-config --root {}`",
            root.display()
        ));
    }
    Ok(())
}

fn config_rows(root: &Path) -> Vec<ConfigRow> {
    check_config(root)
        .into_iter()
        .map(|status| ConfigRow {
            path: status.path,
            present: yes_no(status.exists),
            template: yes_no(status.example_exists),
        })
        .collect()
}

/// Loads the configuration file and checks the files it references.
///
/// # Errors
///
/// Fails when the file does not load, or with [`CliError::Validation`] when
/// a referenced file is missing or malformed.
pub fn run_validate_config(path: &Path, format: OutputFormat) -> crate::CliResult<()> {
    let config = MaxConfig::load(path)?;
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let rows = validate_references(&config, root);
    output(&rows, format)?;

    let problems = rows.iter().filter(|row| row.result != "ok").count();
    if problems > 0 {
        return Err(CliError::Validation(problems));
    }
    if format == OutputFormat::Table {
        success(&format!("{} is valid", path.display()));
        if config.app.mock_digid {
            error("app.mock_digid is enabled; logins are not verified by DigiD");
        }
    }
    Ok(())
}

fn validate_references(config: &MaxConfig, root: &Path) -> Vec<CheckRow> {
    let mut rows = Vec::new();
    let mut check = |check: String, result: Result<(), String>| {
        rows.push(CheckRow {
            check,
            result: result.err().unwrap_or_else(|| "ok".to_string()),
        });
    };

    check(
        format!("clients file {}", config.oidc.clients_file),
        read(root, &config.oidc.clients_file).and_then(|contents| {
            match serde_json::from_str::<serde_json::Value>(&contents) {
                Ok(value) if value.is_object() => Ok(()),
                Ok(_) => Err("not a JSON object".to_string()),
                Err(e) => Err(format!("invalid JSON: {e}")),
            }
        }),
    );

    check(
        format!("signing key {}", config.oidc.rsa_private_key),
        read(root, &config.oidc.rsa_private_key).and_then(|contents| {
            if contents.contains("PRIVATE KEY") {
                Ok(())
            } else {
                Err("not a PEM private key".to_string())
            }
        }),
    );

    for name in &config.saml.identity_providers {
        let settings = Path::new(&config.saml.identity_provider_base_path)
            .join(name)
            .join("settings.json");
        let settings = settings.to_string_lossy();
        check(
            format!("identity provider {name}"),
            read(root, &settings).and_then(|contents| {
                serde_json::from_str::<serde_json::Value>(&contents)
                    .map(|_| ())
                    .map_err(|e| format!("invalid JSON: {e}"))
            }),
        );
    }

    check(
        "redis.encryption_key".to_string(),
        config.redis.encryption_key.as_deref().map_or(Ok(()), |key| {
            max_crypto::SymmetricEncrypter::from_hex(key)
                .map(|_| ())
                .map_err(|e| e.to_string())
        }),
    );

    rows
}

fn read(root: &Path, relative: &str) -> Result<String, String> {
    let path = root.join(relative);
    std::fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
}
