use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use envsweep_core::{PackageRecord, PackageSet};

use crate::process::{run_with_deadline, CommandOutcome};

/// Which interpreter's installed-package set to enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentLocator {
    /// The ambient, non-isolated interpreter found on PATH.
    Ambient,
    /// A project-scoped virtual environment rooted at the given directory.
    Venv(PathBuf),
}

impl EnvironmentLocator {
    /// Resolves the concrete interpreter. A venv whose interpreter does not
    /// exist on disk is an error; the caller decides whether that is fatal.
    pub fn interpreter(&self) -> Result<PathBuf> {
        match self {
            Self::Ambient => Ok(PathBuf::from(ambient_python())),
            Self::Venv(root) => {
                let interpreter = venv_interpreter_path(root);
                if !interpreter.exists() {
                    return Err(anyhow!(
                        "virtual environment not found at {}",
                        root.display()
                    ));
                }
                Ok(interpreter)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Ambient => "global environment".to_string(),
            Self::Venv(root) => format!("venv at {}", root.display()),
        }
    }
}

fn ambient_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

pub fn venv_interpreter_path(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOptions {
    /// None disables the deadline entirely.
    pub timeout: Option<Duration>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// A failed or unparseable listing degrades rather than erroring; the caller
/// is expected to warn and continue with an empty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    Listed(PackageSet),
    Degraded { reason: String },
}

#[derive(Debug, Deserialize)]
struct PipListEntry {
    name: String,
    version: String,
}

/// Enumerates installed packages via `<python> -m pip list --format=json`.
pub fn list_packages(
    locator: &EnvironmentLocator,
    options: ListingOptions,
) -> Result<ListingOutcome> {
    let interpreter = locator.interpreter()?;

    let mut command = Command::new(&interpreter);
    command.args(["-m", "pip", "list", "--format=json"]);
    let output = match run_with_deadline(command, options.timeout)
        .with_context(|| format!("failed to list packages for {}", locator.describe()))?
    {
        CommandOutcome::Finished(output) => output,
        CommandOutcome::TimedOut => {
            return Ok(ListingOutcome::Degraded {
                reason: format!("pip list timed out for {}", locator.describe()),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Ok(ListingOutcome::Degraded {
            reason: format!(
                "pip list failed for {}: {}",
                locator.describe(),
                stderr.trim()
            ),
        });
    }

    match parse_pip_list(&output.stdout) {
        Ok(packages) => Ok(ListingOutcome::Listed(packages)),
        Err(err) => Ok(ListingOutcome::Degraded {
            reason: format!(
                "unreadable pip list output for {}: {err:#}",
                locator.describe()
            ),
        }),
    }
}

pub(crate) fn parse_pip_list(raw: &[u8]) -> Result<PackageSet> {
    let entries: Vec<PipListEntry> =
        serde_json::from_slice(raw).context("pip list output is not valid json")?;
    Ok(PackageSet::from_records(
        entries
            .into_iter()
            .map(|entry| PackageRecord::new(entry.name, entry.version)),
    ))
}
