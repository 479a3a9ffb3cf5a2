use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};

use envsweep_core::{
    classify, load_requirements, ClassifyReport, PackageSet, PolicyOverlay, RetentionPolicy,
};
use envsweep_pip::{
    list_packages, venv_interpreter_path, EnvironmentLocator, ListingOptions, ListingOutcome,
    UninstallOptions, UninstallReport,
};
use envsweep_snapshot::BackupReceipt;

use crate::prompt::{confirm_typed_yes, confirm_yes_no, PromptAnswer};
use crate::render::TerminalRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CleanRequest {
    /// Explicitly requested venv; `None` means the conventional `./venv`,
    /// which degrades to a prompt instead of an error when absent.
    pub venv: Option<PathBuf>,
    pub requirements: PathBuf,
    pub config: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub dry_run: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CleanOutcome {
    Completed,
    NothingToDo,
    PreviewOnly,
    Aborted,
    RemovalFailed,
}

/// Answers the two confirmation prompts. The production implementation reads
/// stdin; tests script the replies.
pub(crate) trait CleanPrompts {
    fn confirm(&mut self, question: &str) -> Result<PromptAnswer>;
    fn confirm_destructive(&mut self, question: &str) -> Result<PromptAnswer>;
}

pub(crate) struct StdinPrompts;

impl CleanPrompts for StdinPrompts {
    fn confirm(&mut self, question: &str) -> Result<PromptAnswer> {
        confirm_yes_no(question)
    }

    fn confirm_destructive(&mut self, question: &str) -> Result<PromptAnswer> {
        confirm_typed_yes(question)
    }
}

/// The pipeline's side effects: environment probing, listing, backup, and
/// the uninstaller. Kept behind a seam so the flow ordering (no global
/// listing after a declined venv prompt, no uninstall without a backup) is
/// testable without a live pip.
pub(crate) trait CleanEffects {
    fn venv_exists(&self, root: &Path) -> bool;
    fn list_packages(
        &mut self,
        locator: &EnvironmentLocator,
        options: ListingOptions,
    ) -> Result<ListingOutcome>;
    fn write_backup(&mut self, dir: &Path, global: &PackageSet) -> Result<BackupReceipt>;
    fn uninstall(
        &mut self,
        names: &BTreeSet<String>,
        dry_run: bool,
        options: UninstallOptions,
        on_progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<UninstallReport>;
}

pub(crate) struct PipEffects;

impl CleanEffects for PipEffects {
    fn venv_exists(&self, root: &Path) -> bool {
        venv_interpreter_path(root).exists()
    }

    fn list_packages(
        &mut self,
        locator: &EnvironmentLocator,
        options: ListingOptions,
    ) -> Result<ListingOutcome> {
        envsweep_pip::list_packages(locator, options)
    }

    fn write_backup(&mut self, dir: &Path, global: &PackageSet) -> Result<BackupReceipt> {
        envsweep_snapshot::write_backup(dir, global)
    }

    fn uninstall(
        &mut self,
        names: &BTreeSet<String>,
        dry_run: bool,
        options: UninstallOptions,
        on_progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<UninstallReport> {
        envsweep_pip::uninstall_packages(
            &EnvironmentLocator::Ambient,
            names,
            dry_run,
            options,
            on_progress,
        )
    }
}

/// The cleanup pipeline's mutation gate. Transitions only run in order;
/// skipping a stage is a programming error, not a user error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CleanupStage {
    Analyzed,
    BackedUp,
    Confirmed,
    Removed,
}

#[derive(Debug)]
pub(crate) struct CleanupFlow {
    stage: CleanupStage,
}

impl CleanupFlow {
    pub(crate) fn analyzed() -> Self {
        Self {
            stage: CleanupStage::Analyzed,
        }
    }

    pub(crate) fn stage(&self) -> CleanupStage {
        self.stage
    }

    pub(crate) fn mark_backed_up(&mut self) -> Result<()> {
        self.advance(CleanupStage::Analyzed, CleanupStage::BackedUp)
    }

    pub(crate) fn mark_confirmed(&mut self) -> Result<()> {
        self.advance(CleanupStage::BackedUp, CleanupStage::Confirmed)
    }

    pub(crate) fn mark_removed(&mut self) -> Result<()> {
        self.advance(CleanupStage::Confirmed, CleanupStage::Removed)
    }

    fn advance(&mut self, expected: CleanupStage, next: CleanupStage) -> Result<()> {
        if self.stage != expected {
            return Err(anyhow!(
                "cleanup stage out of order: {next:?} requires {expected:?}, currently {:?}",
                self.stage
            ));
        }
        self.stage = next;
        Ok(())
    }
}

pub(crate) fn run_clean_command(request: &CleanRequest) -> Result<CleanOutcome> {
    run_clean_command_with(request, &mut StdinPrompts, &mut PipEffects)
}

pub(crate) fn run_clean_command_with(
    request: &CleanRequest,
    prompts: &mut dyn CleanPrompts,
    effects: &mut dyn CleanEffects,
) -> Result<CleanOutcome> {
    let renderer = TerminalRenderer::current();
    renderer.print_section("global environment cleanup");

    let Some(venv_packages) = resolve_venv_packages(request, renderer, prompts, effects)? else {
        println!("Aborted.");
        return Ok(CleanOutcome::Aborted);
    };

    renderer.print_status("..", "analyzing global environment");
    let global_packages =
        match effects.list_packages(&EnvironmentLocator::Ambient, listing_options(request))? {
            ListingOutcome::Listed(packages) => packages,
            ListingOutcome::Degraded { reason } => {
                renderer.print_status("warn", &reason);
                PackageSet::new()
            }
        };
    renderer.print_status("ok", &format!("packages in global: {}", global_packages.len()));

    let declared = load_requirements(&request.requirements)?;
    if !declared.is_empty() {
        renderer.print_status(
            "ok",
            &format!(
                "loaded {} declared dependencies from {}",
                declared.len(),
                request.requirements.display()
            ),
        );
    }

    let policy = match &request.config {
        Some(path) => RetentionPolicy::default().with_overlay(&PolicyOverlay::load(path)?),
        None => RetentionPolicy::default(),
    };

    let report = classify(&global_packages, &venv_packages, &declared, &policy);
    let mut flow = CleanupFlow::analyzed();

    renderer.print_section("analysis");
    renderer.print_lines(&format_analysis_lines(&report, &global_packages, &venv_packages));

    if report.safe_to_remove.is_empty() {
        renderer.print_status(
            "ok",
            "no packages identified for removal; the global environment looks clean",
        );
        return Ok(CleanOutcome::NothingToDo);
    }

    renderer.print_section("dry run");
    renderer.print_lines(&format_preview_lines(&report.safe_to_remove));

    if request.dry_run {
        return Ok(CleanOutcome::PreviewOnly);
    }

    if prompts.confirm("\nCreate backup and uninstall these packages? (y/N):")?
        == PromptAnswer::Declined
    {
        println!("Aborted. No packages were uninstalled.");
        return Ok(CleanOutcome::Aborted);
    }

    renderer.print_status("..", "creating backup");
    let receipt = effects.write_backup(&request.backup_dir, &global_packages)?;
    flow.mark_backed_up()?;
    renderer.print_lines(&format_backup_lines(&receipt));

    renderer.print_status(
        "warn",
        &format!(
            "about to uninstall {} packages from the global environment",
            report.safe_to_remove.len()
        ),
    );
    if prompts.confirm_destructive("Type 'yes' to confirm:")? == PromptAnswer::Declined {
        println!("Aborted. No packages were uninstalled.");
        return Ok(CleanOutcome::Aborted);
    }
    flow.mark_confirmed()?;

    let total = report.safe_to_remove.len() as u64;
    let mut progress = renderer.start_progress("uninstall", total);
    let result = effects.uninstall(
        &report.safe_to_remove,
        false,
        uninstall_options(request),
        &mut |_, index, _| progress.set(index as u64),
    );
    let uninstall_report = match result {
        Ok(uninstall_report) => uninstall_report,
        Err(err) => {
            progress.finish_abandon();
            return Err(err);
        }
    };

    if let Some(failure) = &uninstall_report.failed {
        progress.finish_abandon();
        renderer.print_lines(&format_uninstall_report_lines(&uninstall_report));
        renderer.print_status(
            "error",
            &format!("uninstall failed for {}: {}", failure.name, failure.detail),
        );
        renderer.print_status(
            "warn",
            &format!("restore with: pip install -r {}", receipt.path.display()),
        );
        return Ok(CleanOutcome::RemovalFailed);
    }

    progress.set(total);
    progress.finish_success();
    flow.mark_removed()?;
    debug_assert_eq!(flow.stage(), CleanupStage::Removed);

    renderer.print_section("cleanup complete");
    renderer.print_lines(&format_uninstall_report_lines(&uninstall_report));
    renderer.print_status("ok", &format!("backup saved to {}", receipt.path.display()));
    Ok(CleanOutcome::Completed)
}

/// Resolves the project environment's packages. `Ok(None)` means the user
/// declined to continue without a venv; nothing has been mutated yet and the
/// global environment has not been listed.
fn resolve_venv_packages(
    request: &CleanRequest,
    renderer: TerminalRenderer,
    prompts: &mut dyn CleanPrompts,
    effects: &mut dyn CleanEffects,
) -> Result<Option<PackageSet>> {
    let venv_root = request
        .venv
        .clone()
        .unwrap_or_else(|| PathBuf::from("venv"));

    if !effects.venv_exists(&venv_root) {
        if request.venv.is_some() {
            return Err(anyhow!(
                "virtual environment not found at {}",
                venv_root.display()
            ));
        }
        renderer.print_status(
            "warn",
            &format!("virtual environment not found at {}", venv_root.display()),
        );
        if prompts.confirm("Continue anyway? (y/N):")? == PromptAnswer::Declined {
            return Ok(None);
        }
        return Ok(Some(PackageSet::new()));
    }

    renderer.print_status(
        "ok",
        &format!("found virtual environment at {}", venv_root.display()),
    );
    let packages = match effects.list_packages(
        &EnvironmentLocator::Venv(venv_root),
        listing_options(request),
    )? {
        ListingOutcome::Listed(packages) => {
            renderer.print_status("ok", &format!("packages in venv: {}", packages.len()));
            packages
        }
        ListingOutcome::Degraded { reason } => {
            renderer.print_status("warn", &reason);
            PackageSet::new()
        }
    };
    Ok(Some(packages))
}

pub(crate) fn run_list_command(venv: Option<&Path>, timeout: Option<Duration>) -> Result<()> {
    let locator = match venv {
        Some(root) => EnvironmentLocator::Venv(root.to_path_buf()),
        None => EnvironmentLocator::Ambient,
    };
    match list_packages(&locator, ListingOptions { timeout })? {
        ListingOutcome::Listed(packages) => {
            if packages.is_empty() {
                println!("No installed packages");
            } else {
                for record in packages.iter() {
                    println!("{} {}", record.name, record.version);
                }
            }
            Ok(())
        }
        ListingOutcome::Degraded { reason } => Err(anyhow!(reason)),
    }
}

fn listing_options(request: &CleanRequest) -> ListingOptions {
    ListingOptions {
        timeout: request.timeout,
    }
}

fn uninstall_options(request: &CleanRequest) -> UninstallOptions {
    UninstallOptions {
        timeout: request.timeout,
    }
}

pub(crate) fn format_analysis_lines(
    report: &ClassifyReport,
    global: &PackageSet,
    venv: &PackageSet,
) -> Vec<String> {
    let mut lines = vec![
        format!("total packages in global: {}", global.len()),
        format!("packages to keep: {}", report.keep.len()),
        format!("packages safe to remove: {}", report.safe_to_remove.len()),
    ];
    for name in &report.safe_to_remove {
        let version = global
            .get(name)
            .map(|record| record.version.as_str())
            .unwrap_or("unknown");
        let marker = if venv.contains(name) {
            "[in-venv]"
        } else {
            "[  --  ]"
        };
        lines.push(format!("  {marker} {name:<30} {version}"));
    }
    lines
}

pub(crate) fn format_preview_lines(candidates: &BTreeSet<String>) -> Vec<String> {
    let mut lines: Vec<String> = candidates
        .iter()
        .map(|name| format!("  would uninstall: {name}"))
        .collect();
    lines.push(format!("total packages to uninstall: {}", candidates.len()));
    lines
}

pub(crate) fn format_backup_lines(receipt: &BackupReceipt) -> Vec<String> {
    vec![
        format!(
            "backup created: {} ({} packages)",
            receipt.path.display(),
            receipt.package_count
        ),
        format!("sha256: {}", receipt.sha256_hex),
        format!("restore with: pip install -r {}", receipt.path.display()),
    ]
}

pub(crate) fn format_uninstall_report_lines(report: &UninstallReport) -> Vec<String> {
    let mut lines = vec![format!(
        "uninstalled {} of {} packages",
        report.removed.len(),
        report.planned.len()
    )];
    if report.failed.is_some() {
        if report.removed.is_empty() {
            lines.push("no packages were removed before the failure".to_string());
        } else {
            for name in &report.removed {
                lines.push(format!("  removed before failure: {name}"));
            }
        }
    }
    lines
}
