use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

use envsweep_core::{classify, PackageRecord, PackageSet, RetentionPolicy};
use envsweep_pip::{
    EnvironmentLocator, ListingOptions, ListingOutcome, UninstallFailure, UninstallOptions,
    UninstallReport,
};
use envsweep_snapshot::BackupReceipt;

use crate::flow::{
    format_analysis_lines, format_backup_lines, format_preview_lines,
    format_uninstall_report_lines, run_clean_command_with, CleanEffects, CleanOutcome,
    CleanPrompts, CleanRequest, CleanupFlow, CleanupStage,
};
use crate::prompt::{is_affirmative_typed_yes, is_affirmative_yes, PromptAnswer};
use crate::render::{format_elapsed, render_status_line, OutputStyle};
use crate::{timeout_from_secs, Cli, Commands};

#[test]
fn clean_defaults_match_conventional_project_layout() {
    let cli = Cli::try_parse_from(["envsweep", "clean"]).expect("clean must parse");
    match cli.command {
        Commands::Clean {
            venv,
            requirements,
            config,
            backup_dir,
            dry_run,
            timeout_secs,
        } => {
            assert_eq!(venv, None);
            assert_eq!(requirements, PathBuf::from("requirements.txt"));
            assert_eq!(config, None);
            assert_eq!(backup_dir, PathBuf::from("."));
            assert!(!dry_run);
            assert_eq!(timeout_secs, 60);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn clean_accepts_overrides() {
    let cli = Cli::try_parse_from([
        "envsweep",
        "clean",
        "--venv",
        ".venv",
        "--requirements",
        "reqs/dev.txt",
        "--dry-run",
        "--timeout-secs",
        "0",
    ])
    .expect("clean must parse");
    match cli.command {
        Commands::Clean {
            venv,
            requirements,
            dry_run,
            timeout_secs,
            ..
        } => {
            assert_eq!(venv, Some(PathBuf::from(".venv")));
            assert_eq!(requirements, PathBuf::from("reqs/dev.txt"));
            assert!(dry_run);
            assert_eq!(timeout_secs, 0);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn missing_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["envsweep"]).is_err());
}

#[test]
fn zero_timeout_disables_the_deadline() {
    assert_eq!(timeout_from_secs(0), None);
    assert_eq!(timeout_from_secs(90), Some(Duration::from_secs(90)));
}

#[test]
fn cleanup_flow_advances_in_order() {
    let mut flow = CleanupFlow::analyzed();
    assert_eq!(flow.stage(), CleanupStage::Analyzed);
    flow.mark_backed_up().expect("analyzed -> backed up");
    flow.mark_confirmed().expect("backed up -> confirmed");
    flow.mark_removed().expect("confirmed -> removed");
    assert_eq!(flow.stage(), CleanupStage::Removed);
}

#[test]
fn cleanup_flow_rejects_removal_before_backup() {
    let mut flow = CleanupFlow::analyzed();
    assert!(flow.mark_confirmed().is_err());
    assert!(flow.mark_removed().is_err());
    assert_eq!(flow.stage(), CleanupStage::Analyzed);
}

#[test]
fn cleanup_flow_rejects_repeated_transitions() {
    let mut flow = CleanupFlow::analyzed();
    flow.mark_backed_up().expect("first transition");
    assert!(flow.mark_backed_up().is_err());
}

#[test]
fn prompt_yes_no_accepts_only_y() {
    assert!(is_affirmative_yes("y"));
    assert!(is_affirmative_yes("Y\n"));
    assert!(!is_affirmative_yes("yes"));
    assert!(!is_affirmative_yes(""));
    assert!(!is_affirmative_yes("n"));
}

#[test]
fn prompt_final_confirmation_requires_typed_yes() {
    assert!(is_affirmative_typed_yes("yes"));
    assert!(is_affirmative_typed_yes("YES\n"));
    assert!(!is_affirmative_typed_yes("y"));
    assert!(!is_affirmative_typed_yes("yep"));
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "packages in global: 12"),
        "packages in global: 12"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "backup created"),
        "[OK] backup created"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "venv missing"),
        "[WARN] venv missing"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "error", "uninstall failed"),
        "[ERR] uninstall failed"
    );
}

#[test]
fn format_elapsed_prints_millis() {
    assert_eq!(format_elapsed(Duration::from_millis(2_340)), "2.340s");
}

fn sample_sets() -> (PackageSet, PackageSet) {
    let global = PackageSet::from_records([
        PackageRecord::new("flask", "2.0"),
        PackageRecord::new("pip", "23.0"),
        PackageRecord::new("black", "24.0"),
    ]);
    let venv = PackageSet::from_records([PackageRecord::new("flask", "2.0")]);
    (global, venv)
}

#[test]
fn analysis_lines_show_totals_and_candidate_rows() {
    let (global, venv) = sample_sets();
    let declared: BTreeSet<String> = ["flask".to_string()].into_iter().collect();
    let report = classify(&global, &venv, &declared, &RetentionPolicy::default());

    let lines = format_analysis_lines(&report, &global, &venv);
    assert_eq!(lines[0], "total packages in global: 3");
    assert_eq!(lines[1], "packages to keep: 2");
    assert_eq!(lines[2], "packages safe to remove: 1");
    assert!(lines[3].contains("[in-venv]"));
    assert!(lines[3].contains("flask"));
    assert!(lines[3].contains("2.0"));
}

#[test]
fn preview_lines_enumerate_sorted_candidates() {
    let candidates: BTreeSet<String> = ["flask", "click"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(
        format_preview_lines(&candidates),
        vec![
            "  would uninstall: click".to_string(),
            "  would uninstall: flask".to_string(),
            "total packages to uninstall: 2".to_string(),
        ]
    );
}

#[test]
fn backup_lines_carry_the_restore_hint() {
    let receipt = BackupReceipt {
        path: PathBuf::from("global_packages_backup_20260828_090503.txt"),
        sha256_hex: "cafe".to_string(),
        package_count: 3,
    };
    let lines = format_backup_lines(&receipt);
    assert_eq!(
        lines[0],
        "backup created: global_packages_backup_20260828_090503.txt (3 packages)"
    );
    assert_eq!(lines[1], "sha256: cafe");
    assert_eq!(
        lines[2],
        "restore with: pip install -r global_packages_backup_20260828_090503.txt"
    );
}

#[test]
fn uninstall_report_lines_communicate_partial_success() {
    let report = UninstallReport {
        planned: vec!["click".to_string(), "flask".to_string()],
        removed: vec!["click".to_string()],
        failed: Some(UninstallFailure {
            name: "flask".to_string(),
            detail: "permission denied".to_string(),
        }),
        dry_run: false,
    };
    assert_eq!(
        format_uninstall_report_lines(&report),
        vec![
            "uninstalled 1 of 2 packages".to_string(),
            "  removed before failure: click".to_string(),
        ]
    );
}

struct ScriptedPrompts {
    replies: Vec<PromptAnswer>,
}

impl ScriptedPrompts {
    fn new(replies: &[PromptAnswer]) -> Self {
        Self {
            replies: replies.to_vec(),
        }
    }

    fn next_reply(&mut self) -> PromptAnswer {
        if self.replies.is_empty() {
            PromptAnswer::Declined
        } else {
            self.replies.remove(0)
        }
    }
}

impl CleanPrompts for ScriptedPrompts {
    fn confirm(&mut self, _question: &str) -> Result<PromptAnswer> {
        Ok(self.next_reply())
    }

    fn confirm_destructive(&mut self, _question: &str) -> Result<PromptAnswer> {
        Ok(self.next_reply())
    }
}

struct RecordingEffects {
    venv_present: bool,
    venv_listing: PackageSet,
    global_listing: PackageSet,
    backup_fails: bool,
    calls: Vec<&'static str>,
}

impl RecordingEffects {
    fn new(venv_present: bool) -> Self {
        Self {
            venv_present,
            venv_listing: PackageSet::new(),
            global_listing: PackageSet::new(),
            backup_fails: false,
            calls: Vec::new(),
        }
    }
}

impl CleanEffects for RecordingEffects {
    fn venv_exists(&self, _root: &Path) -> bool {
        self.venv_present
    }

    fn list_packages(
        &mut self,
        locator: &EnvironmentLocator,
        _options: ListingOptions,
    ) -> Result<ListingOutcome> {
        match locator {
            EnvironmentLocator::Ambient => {
                self.calls.push("list-global");
                Ok(ListingOutcome::Listed(self.global_listing.clone()))
            }
            EnvironmentLocator::Venv(_) => {
                self.calls.push("list-venv");
                Ok(ListingOutcome::Listed(self.venv_listing.clone()))
            }
        }
    }

    fn write_backup(&mut self, _dir: &Path, global: &PackageSet) -> Result<BackupReceipt> {
        self.calls.push("backup");
        if self.backup_fails {
            return Err(anyhow!("backup destination is not writable"));
        }
        Ok(BackupReceipt {
            path: PathBuf::from("global_packages_backup_20260828_090503.txt"),
            sha256_hex: "cafe".to_string(),
            package_count: global.len(),
        })
    }

    fn uninstall(
        &mut self,
        names: &BTreeSet<String>,
        dry_run: bool,
        _options: UninstallOptions,
        _on_progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<UninstallReport> {
        self.calls.push("uninstall");
        Ok(UninstallReport {
            planned: names.iter().cloned().collect(),
            removed: names.iter().cloned().collect(),
            failed: None,
            dry_run,
        })
    }
}

fn clean_request() -> CleanRequest {
    CleanRequest {
        venv: None,
        requirements: PathBuf::from("/nonexistent/envsweep/requirements.txt"),
        config: None,
        backup_dir: PathBuf::from("."),
        dry_run: false,
        timeout: None,
    }
}

#[test]
fn declining_the_missing_venv_prompt_aborts_before_any_listing() {
    let request = clean_request();
    let mut prompts = ScriptedPrompts::new(&[PromptAnswer::Declined]);
    let mut effects = RecordingEffects::new(false);

    let outcome = run_clean_command_with(&request, &mut prompts, &mut effects)
        .expect("declined prompt is not an error");

    assert_eq!(outcome, CleanOutcome::Aborted);
    // the global environment was never enumerated, let alone classified
    assert!(effects.calls.is_empty(), "unexpected calls: {:?}", effects.calls);
}

#[test]
fn backup_failure_prevents_the_uninstall_step() {
    let request = clean_request();
    let mut prompts = ScriptedPrompts::new(&[PromptAnswer::Affirmed, PromptAnswer::Affirmed]);
    let mut effects = RecordingEffects::new(true);
    effects.backup_fails = true;
    effects.global_listing = PackageSet::from_records([
        PackageRecord::new("flask", "2.0"),
        PackageRecord::new("pip", "23.0"),
    ]);
    effects.venv_listing = PackageSet::from_records([PackageRecord::new("flask", "2.0")]);

    let err = run_clean_command_with(&request, &mut prompts, &mut effects)
        .expect_err("backup failure must fail the run");

    assert!(err.to_string().contains("not writable"));
    assert_eq!(effects.calls, vec!["list-venv", "list-global", "backup"]);
}

#[test]
fn full_run_orders_listing_backup_and_uninstall() {
    let request = clean_request();
    let mut prompts = ScriptedPrompts::new(&[PromptAnswer::Affirmed, PromptAnswer::Affirmed]);
    let mut effects = RecordingEffects::new(true);
    effects.global_listing = PackageSet::from_records([
        PackageRecord::new("flask", "2.0"),
        PackageRecord::new("pip", "23.0"),
        PackageRecord::new("black", "24.0"),
    ]);
    effects.venv_listing = PackageSet::from_records([PackageRecord::new("flask", "2.0")]);

    let outcome = run_clean_command_with(&request, &mut prompts, &mut effects)
        .expect("scripted run must succeed");

    assert_eq!(outcome, CleanOutcome::Completed);
    assert_eq!(
        effects.calls,
        vec!["list-venv", "list-global", "backup", "uninstall"]
    );
}

#[test]
fn declining_the_destructive_prompt_stops_after_the_backup() {
    let request = clean_request();
    let mut prompts = ScriptedPrompts::new(&[PromptAnswer::Affirmed, PromptAnswer::Declined]);
    let mut effects = RecordingEffects::new(true);
    effects.global_listing = PackageSet::from_records([PackageRecord::new("flask", "2.0")]);
    effects.venv_listing = PackageSet::from_records([PackageRecord::new("flask", "2.0")]);

    let outcome = run_clean_command_with(&request, &mut prompts, &mut effects)
        .expect("declined prompt is not an error");

    assert_eq!(outcome, CleanOutcome::Aborted);
    assert_eq!(effects.calls, vec!["list-venv", "list-global", "backup"]);
}

#[test]
fn interrupt_handler_installs_once_per_process() {
    crate::install_interrupt_handler().expect("handler must install");
}

#[test]
fn uninstall_report_lines_note_when_nothing_was_removed() {
    let report = UninstallReport {
        planned: vec!["flask".to_string()],
        removed: Vec::new(),
        failed: Some(UninstallFailure {
            name: "flask".to_string(),
            detail: "permission denied".to_string(),
        }),
        dry_run: false,
    };
    assert_eq!(
        format_uninstall_report_lines(&report),
        vec![
            "uninstalled 0 of 1 packages".to_string(),
            "no packages were removed before the failure".to_string(),
        ]
    );
}
