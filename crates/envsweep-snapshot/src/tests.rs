use std::fs;
use std::path::PathBuf;

use chrono::TimeZone;
use sha2::Digest;

use envsweep_core::{PackageRecord, PackageSet};

use super::*;

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("envsweep-snapshot-test-{nanos}"))
}

fn sample_packages() -> PackageSet {
    PackageSet::from_records([
        PackageRecord::new("flask", "2.0"),
        PackageRecord::new("pip", "23.0"),
        PackageRecord::new("black", "24.0"),
    ])
}

#[test]
fn backup_file_name_embeds_timestamp() {
    let now = chrono::Local
        .with_ymd_and_hms(2026, 8, 28, 9, 5, 3)
        .single()
        .expect("valid timestamp");
    assert_eq!(
        backup_file_name(now),
        "global_packages_backup_20260828_090503.txt"
    );
}

#[test]
fn render_backup_pins_sorted_by_name() {
    assert_eq!(
        render_backup(&sample_packages()),
        "black==24.0\nflask==2.0\npip==23.0\n"
    );
}

#[test]
fn backup_round_trip_reproduces_pairs() {
    let dir = test_dir();
    let receipt = write_backup(&dir, &sample_packages()).expect("backup must write");
    assert_eq!(receipt.package_count, 3);

    let raw = fs::read_to_string(&receipt.path).expect("backup must be readable");
    let entries = parse_backup(&raw).expect("backup must parse");
    assert_eq!(
        entries,
        vec![
            ("black".to_string(), "24.0".to_string()),
            ("flask".to_string(), "2.0".to_string()),
            ("pip".to_string(), "23.0".to_string()),
        ]
    );

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn write_leaves_no_temp_file_behind() {
    let dir = test_dir();
    let receipt = write_backup(&dir, &sample_packages()).expect("backup must write");

    let leftovers: Vec<_> = fs::read_dir(&dir)
        .expect("backup dir must exist")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path() != receipt.path)
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn receipt_digest_matches_file_content() {
    let dir = test_dir();
    let receipt = write_backup(&dir, &sample_packages()).expect("backup must write");

    let written = fs::read(&receipt.path).expect("backup must be readable");
    let mut hasher = sha2::Sha256::new();
    hasher.update(&written);
    assert_eq!(receipt.sha256_hex, hex::encode(hasher.finalize()));

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn unwritable_destination_is_an_error() {
    let missing_parent = PathBuf::from("/nonexistent/envsweep/backups/backup.txt");
    assert!(write_backup_to(&missing_parent, &sample_packages()).is_err());
}

#[test]
fn parse_backup_rejects_unpinned_lines() {
    assert!(parse_backup("flask\n").is_err());
    assert!(parse_backup("flask>=2.0\n").is_err());
}

#[test]
fn parse_backup_skips_comments_and_blanks() {
    let entries = parse_backup("# restored via pip install -r\n\nflask==2.0\n")
        .expect("backup must parse");
    assert_eq!(entries, vec![("flask".to_string(), "2.0".to_string())]);
}
