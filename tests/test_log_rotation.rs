//! Integration tests for size-triggered log rotation.
//!
//! Run with:
//!   cargo test --test test_log_rotation

use std::fs;
use std::io::Read;

use chrono::{Local, TimeZone};
use tempfile::TempDir;

use helpbot::subsystems::maintenance::rotation::{maybe_archive, maybe_archive_at};

// ── helpers ──────────────────────────────────────────────────────────────────

fn log_with(tmp: &TempDir, bytes: usize) -> std::path::PathBuf {
    let log = tmp.path().join("app.log");
    let line = b"2026-01-01 00:00:00 - INFO - support request handled\n";
    let body: Vec<u8> = line.iter().copied().cycle().take(bytes).collect();
    fs::write(&log, body).unwrap();
    log
}

fn archives(tmp: &TempDir) -> Vec<std::path::PathBuf> {
    let dir = tmp.path().join("archives");
    if !dir.exists() {
        return Vec::new();
    }
    let mut out: Vec<_> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
    out.sort();
    out
}

// ── threshold ─────────────────────────────────────────────────────────────────

#[test]
fn exactly_at_threshold_is_left_alone() {
    let tmp = TempDir::new().unwrap();
    let log = log_with(&tmp, 2 * 1024);

    let archived = maybe_archive(&log, &tmp.path().join("archives"), 2).unwrap();

    assert!(archived.is_none());
    assert!(archives(&tmp).is_empty());
    assert_eq!(fs::metadata(&log).unwrap().len(), 2048);
}

#[test]
fn one_byte_over_archives_and_truncates() {
    let tmp = TempDir::new().unwrap();
    let log = log_with(&tmp, 2 * 1024 + 1);
    let original = fs::read(&log).unwrap();

    let archived = maybe_archive(&log, &tmp.path().join("archives"), 2).unwrap().unwrap();

    assert_eq!(archives(&tmp), vec![archived.clone()]);
    assert_eq!(fs::metadata(&log).unwrap().len(), 0);

    let mut zip = zip::ZipArchive::new(fs::File::open(&archived).unwrap()).unwrap();
    assert_eq!(zip.len(), 1);
    let mut entry = zip.by_index(0).unwrap();
    assert_eq!(entry.name(), "app.log");
    assert_eq!(entry.compression(), zip::CompressionMethod::Deflated);
    let mut restored = Vec::new();
    entry.read_to_end(&mut restored).unwrap();
    assert_eq!(restored, original);
}

// ── naming & accumulation ─────────────────────────────────────────────────────

#[test]
fn archives_accumulate_with_timestamped_names() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("archives");
    let first = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
    let second = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 8).unwrap();

    let log = log_with(&tmp, 4096);
    maybe_archive_at(&log, &dir, 1, first).unwrap();
    fs::write(&log, vec![b'y'; 4096]).unwrap();
    maybe_archive_at(&log, &dir, 1, second).unwrap();

    let names: Vec<String> = archives(&tmp)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["app_20260304050607.zip", "app_20260304050608.zip"]);
}

#[test]
fn same_second_collision_keeps_log() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("archives");
    let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();

    let log = log_with(&tmp, 4096);
    maybe_archive_at(&log, &dir, 1, now).unwrap();
    fs::write(&log, vec![b'z'; 4096]).unwrap();

    assert!(maybe_archive_at(&log, &dir, 1, now).is_err());
    assert_eq!(fs::metadata(&log).unwrap().len(), 4096);
    assert_eq!(archives(&tmp).len(), 1);
}
