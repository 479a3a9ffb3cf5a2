mod listing;
mod process;
mod uninstall;

pub use listing::{
    list_packages, venv_interpreter_path, EnvironmentLocator, ListingOptions, ListingOutcome,
};
pub use uninstall::{uninstall_packages, UninstallFailure, UninstallOptions, UninstallReport};
