//! Backup snapshots of a global environment: sorted `name==version` lines,
//! written atomically and verified after the rename. The backup file is the
//! restore path (`pip install -r <backup>`), so it must never be observable
//! in a partially written state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use envsweep_core::PackageSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReceipt {
    pub path: PathBuf,
    pub sha256_hex: String,
    pub package_count: usize,
}

pub fn backup_file_name(now: DateTime<Local>) -> String {
    format!("global_packages_backup_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

/// Pins every package as a `name==version` line, sorted by name.
pub fn render_backup(global: &PackageSet) -> String {
    let mut payload = String::new();
    for record in global.iter() {
        payload.push_str(&record.name);
        payload.push_str("==");
        payload.push_str(&record.version);
        payload.push('\n');
    }
    payload
}

/// Writes a timestamped backup into `dir`. Any failure here is fatal to the
/// removal flow: the caller must never uninstall without a verified backup.
pub fn write_backup(dir: &Path, global: &PackageSet) -> Result<BackupReceipt> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create backup directory: {}", dir.display()))?;
    write_backup_to(&dir.join(backup_file_name(Local::now())), global)
}

pub fn write_backup_to(path: &Path, global: &PackageSet) -> Result<BackupReceipt> {
    let payload = render_backup(global);
    let digest = sha256_hex(payload.as_bytes());

    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| anyhow!("backup path has no file name: {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, payload.as_bytes())
        .with_context(|| format!("failed to write backup temp file: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to move backup into place: {}", path.display()))?;

    // verify-after-write: re-read the renamed file and compare digests
    let written = fs::read(path)
        .with_context(|| format!("failed to verify backup file: {}", path.display()))?;
    if sha256_hex(&written) != digest {
        return Err(anyhow!(
            "backup verification failed: {} does not match written content",
            path.display()
        ));
    }

    Ok(BackupReceipt {
        path: path.to_path_buf(),
        sha256_hex: digest,
        package_count: global.len(),
    })
}

/// Parses a backup file back into `(name, version)` pairs. Round-trips
/// exactly with `render_backup`.
pub fn parse_backup(raw: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, version)) = line.split_once("==") else {
            return Err(anyhow!("unpinned backup line: {line}"));
        };
        entries.push((name.trim().to_string(), version.trim().to_string()));
    }
    Ok(entries)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests;
