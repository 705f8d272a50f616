//! Configuration bootstrap.
//!
//! Every tracked configuration file ships with a `<path>.example` template.
//! [`setup_config`] copies the template into place for each tracked path that
//! does not exist yet. Existing files are never touched, so running it again
//! is a no-op.
//!
//! The first missing template aborts the run: later paths are not processed.

use anyhow::{Context as _, Result, bail};
use std::path::{Path, PathBuf};

/// Configuration files managed by the bootstrap, in processing order.
pub const TRACKED_PATHS: [&str; 3] = ["max.conf", "clients.json", "saml/tvs/settings.json"];

/// Suffix of the template belonging to a tracked path.
pub const EXAMPLE_SUFFIX: &str = ".example";

/// What happened to a single tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file already existed and was left alone.
    Kept,
    /// The file was created from its template.
    Created,
}

/// Per-path outcomes of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Tracked paths relative to the root, with their outcome.
    pub entries: Vec<(String, FileOutcome)>,
}

impl BootstrapReport {
    /// Number of files created during the run.
    #[must_use]
    pub fn created(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| *outcome == FileOutcome::Created)
            .count()
    }
}

/// Presence of a tracked file and its template, as seen by [`check_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatus {
    /// Tracked path relative to the root.
    pub path: String,
    /// Whether the configuration file exists.
    pub exists: bool,
    /// Whether the `.example` template exists.
    pub example_exists: bool,
}

/// Returns the template path for a tracked path.
#[must_use]
pub fn example_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(EXAMPLE_SUFFIX);
    PathBuf::from(name)
}

/// Copies `<path>.example` to `<path>` for every absent tracked path under `root`.
///
/// # Errors
///
/// Fails on the first absent path whose template is missing, or when a copy
/// fails. Paths after the failing one are not processed.
pub fn setup_config(root: &Path) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    for relative in TRACKED_PATHS {
        let outcome = ensure_file(root, relative)?;
        report.entries.push((relative.to_string(), outcome));
    }

    Ok(report)
}

fn ensure_file(root: &Path, relative: &str) -> Result<FileOutcome> {
    let target = root.join(relative);
    if target.exists() {
        tracing::debug!(path = %target.display(), "configuration file present");
        return Ok(FileOutcome::Kept);
    }

    let example = example_path(&target);
    if !example.is_file() {
        bail!(
            "cannot create {}: template {} is missing",
            target.display(),
            example.display()
        );
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::copy(&example, &target)
        .with_context(|| format!("copying {} to {}", example.display(), target.display()))?;

    tracing::info!(path = %target.display(), "created configuration file from template");
    Ok(FileOutcome::Created)
}

/// Reports which tracked files and templates exist under `root` without changing anything.
#[must_use]
pub fn check_config(root: &Path) -> Vec<ConfigStatus> {
    TRACKED_PATHS
        .iter()
        .map(|relative| {
            let target = root.join(relative);
            ConfigStatus {
                path: (*relative).to_string(),
                exists: target.exists(),
                example_exists: example_path(&target).is_file(),
            }
        })
        .collect()
}
