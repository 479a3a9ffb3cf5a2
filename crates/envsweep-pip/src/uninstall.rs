use std::collections::BTreeSet;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::listing::EnvironmentLocator;
use crate::process::{run_with_deadline, CommandOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Per-package deadline. None disables it.
    pub timeout: Option<Duration>,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallFailure {
    pub name: String,
    pub detail: String,
}

/// Outcome of one removal pass. `removed` lists exactly the packages pip
/// confirmed gone before any failure; partial success is never silent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub planned: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Option<UninstallFailure>,
    pub dry_run: bool,
}

impl UninstallReport {
    pub fn fully_removed(&self) -> bool {
        !self.dry_run && self.failed.is_none() && self.removed.len() == self.planned.len()
    }
}

/// Removes the given packages from the located environment, one `pip
/// uninstall -y` invocation per package in sorted order so a failure leaves a
/// precise record of what was already removed. A dry run touches nothing.
pub fn uninstall_packages(
    locator: &EnvironmentLocator,
    names: &BTreeSet<String>,
    dry_run: bool,
    options: UninstallOptions,
    mut on_progress: impl FnMut(&str, usize, usize),
) -> Result<UninstallReport> {
    let mut report = UninstallReport {
        planned: names.iter().cloned().collect(),
        removed: Vec::new(),
        failed: None,
        dry_run,
    };
    if dry_run || names.is_empty() {
        return Ok(report);
    }

    let interpreter = locator.interpreter()?;
    let total = names.len();
    for (index, name) in names.iter().enumerate() {
        on_progress(name, index, total);

        let mut command = Command::new(&interpreter);
        command.args(["-m", "pip", "uninstall", "-y", name]);
        let outcome = run_with_deadline(command, options.timeout)
            .with_context(|| format!("failed to run pip uninstall for {name}"))?;

        let failure = match outcome {
            CommandOutcome::TimedOut => Some(format!("pip uninstall timed out for {name}")),
            CommandOutcome::Finished(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                Some(if stderr.is_empty() {
                    format!("pip uninstall exited with {}", output.status)
                } else {
                    stderr.to_string()
                })
            }
            CommandOutcome::Finished(_) => None,
        };

        match failure {
            Some(detail) => {
                report.failed = Some(UninstallFailure {
                    name: name.clone(),
                    detail,
                });
                break;
            }
            None => report.removed.push(name.clone()),
        }
    }

    Ok(report)
}
