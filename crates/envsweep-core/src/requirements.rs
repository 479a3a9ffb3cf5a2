use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

use crate::package::normalize_name;

/// Bare lowercased package names declared in a requirements manifest.
pub type DeclaredDependencySet = BTreeSet<String>;

/// Reads a requirements manifest. An absent file is not an error and yields
/// an empty set.
pub fn load_requirements(path: &Path) -> Result<DeclaredDependencySet> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read requirements file: {}", path.display()));
        }
    };
    Ok(parse_requirements_str(&raw))
}

/// Line-oriented requirements parsing: blank lines and `#` comments are
/// skipped, version specifiers (`==`, `>=`, `<=`, `>`, `<`) and extras
/// brackets are stripped, only the bare lowercased name is kept.
pub fn parse_requirements_str(raw: &str) -> DeclaredDependencySet {
    raw.lines().filter_map(requirement_name).collect()
}

fn requirement_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let end = line
        .find(|ch| matches!(ch, '=' | '>' | '<' | '['))
        .unwrap_or(line.len());
    let name = line[..end].trim();
    if name.is_empty() {
        return None;
    }
    Some(normalize_name(name))
}
