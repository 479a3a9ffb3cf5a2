use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::package::normalize_name;

/// Packages the packaging toolchain itself depends on. Never removable.
const CORE_PACKAGES: &[&str] = &["pip", "setuptools", "wheel"];

/// Development tools retained even when they also appear in the project
/// environment.
const ESSENTIAL_TOOLS: &[&str] = &[
    "jupyter",
    "jupyterlab",
    "ipython",
    "ipykernel",
    "notebook",
    "pip",
    "setuptools",
    "wheel",
    "pipx",
    "black",
    "pytest",
    "flake8",
    "mypy",
    "autopep8",
];

/// The allow-lists consulted before any removability rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub core_packages: BTreeSet<String>,
    pub essential_tools: BTreeSet<String>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            core_packages: CORE_PACKAGES.iter().map(|name| name.to_string()).collect(),
            essential_tools: ESSENTIAL_TOOLS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl RetentionPolicy {
    pub fn is_core(&self, name: &str) -> bool {
        self.core_packages.contains(&normalize_name(name))
    }

    pub fn is_essential(&self, name: &str) -> bool {
        self.essential_tools.contains(&normalize_name(name))
    }

    /// Overlay entries extend the built-in allow-lists; they can never shrink
    /// them.
    pub fn with_overlay(mut self, overlay: &PolicyOverlay) -> Self {
        self.core_packages
            .extend(overlay.extra_core.iter().map(|name| normalize_name(name)));
        self.essential_tools.extend(
            overlay
                .extra_essential
                .iter()
                .map(|name| normalize_name(name)),
        );
        self
    }
}

/// Optional user additions to the retention allow-lists, read from a small
/// TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PolicyOverlay {
    #[serde(default)]
    pub extra_core: Vec<String>,
    #[serde(default)]
    pub extra_essential: Vec<String>,
}

impl PolicyOverlay {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse retention policy overlay")
    }

    /// An absent overlay file is not an error and yields the empty overlay.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read policy overlay: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid policy overlay: {}", path.display()))
    }
}
