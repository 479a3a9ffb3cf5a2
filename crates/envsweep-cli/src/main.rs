use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod flow;
mod prompt;
mod render;

use flow::{run_clean_command, run_list_command, CleanOutcome, CleanRequest};

#[derive(Parser, Debug)]
#[command(name = "envsweep")]
#[command(about = "Reconcile a global Python environment against a project venv", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify global packages and remove the redundant ones after
    /// backup and confirmation
    Clean {
        /// Project virtual environment (default: ./venv, prompting when absent)
        #[arg(long)]
        venv: Option<PathBuf>,
        /// Requirements manifest with declared dependencies
        #[arg(long, default_value = "requirements.txt")]
        requirements: PathBuf,
        /// TOML overlay extending the core/essential allow-lists
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory the backup snapshot is written into
        #[arg(long, default_value = ".")]
        backup_dir: PathBuf,
        /// Preview the removal set without mutating anything
        #[arg(long)]
        dry_run: bool,
        /// Deadline for each pip invocation, 0 disables it
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Enumerate an environment's installed packages
    List {
        /// Virtual environment to list instead of the global one
        #[arg(long)]
        venv: Option<PathBuf>,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Generate a shell completion script
    Completions { shell: Shell },
}

const INTERRUPT_MESSAGE: &str = "Aborted by user.";

fn main() -> ExitCode {
    if let Err(err) = install_interrupt_handler() {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Ctrl-C behaves like any other decline: message, exit 0. Mutation is gated
/// behind the confirmation prompts, so an interrupt before consent leaves the
/// environment untouched.
fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        println!("\n{INTERRUPT_MESSAGE}");
        std::process::exit(0);
    })
    .context("failed to install interrupt handler")
}

fn run_cli(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Clean {
            venv,
            requirements,
            config,
            backup_dir,
            dry_run,
            timeout_secs,
        } => {
            let request = CleanRequest {
                venv,
                requirements,
                config,
                backup_dir,
                dry_run,
                timeout: timeout_from_secs(timeout_secs),
            };
            let outcome = run_clean_command(&request)?;
            Ok(match outcome {
                CleanOutcome::Completed
                | CleanOutcome::NothingToDo
                | CleanOutcome::PreviewOnly
                | CleanOutcome::Aborted => ExitCode::SUCCESS,
                CleanOutcome::RemovalFailed => ExitCode::FAILURE,
            })
        }
        Commands::List { venv, timeout_secs } => {
            run_list_command(venv.as_deref(), timeout_from_secs(timeout_secs))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "envsweep", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests;
