//! Size-triggered log rotation.
//!
//! When the live log grows past the threshold its bytes are written into
//! `app_<YYYYMMDDHHMMSS>.zip` (one deflated entry named after the log file)
//! and the log is truncated to zero length.
//!
//! The archive is written to a hidden `.partial` sibling, synced, and renamed
//! into place. The log is only truncated after the rename succeeds; any
//! failure before that point leaves the log untouched.
//!
//! When the rotator shares the logger's [`LogSink`] it holds the sink lock
//! from the size check to the truncate, so no event is written in between.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::AppError;
use crate::logger::LogSink;

/// Archive file name prefix.
const ARCHIVE_PREFIX: &str = "app_";
/// Local-time layout of the archive timestamp.
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Watches one log file and archives it once it exceeds `max_size_kb`.
#[derive(Debug, Clone)]
pub struct LogRotator {
    log_path: PathBuf,
    archive_dir: PathBuf,
    max_size_kb: u64,
    sink: Option<LogSink>,
}

impl LogRotator {
    pub fn new(log_path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>, max_size_kb: u64) -> Self {
        Self {
            log_path: log_path.into(),
            archive_dir: archive_dir.into(),
            max_size_kb,
            sink: None,
        }
    }

    /// Rotator for the file behind `sink`, locking it while rotating.
    pub fn for_sink(sink: LogSink, archive_dir: impl Into<PathBuf>, max_size_kb: u64) -> Self {
        Self {
            log_path: sink.path().to_path_buf(),
            archive_dir: archive_dir.into(),
            max_size_kb,
            sink: Some(sink),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Run one rotation check. Returns the archive path when one was written.
    pub fn maybe_archive(&self) -> Result<Option<PathBuf>, AppError> {
        self.maybe_archive_at(Local::now())
    }

    /// [`Self::maybe_archive`] with an explicit clock.
    pub fn maybe_archive_at(&self, now: DateTime<Local>) -> Result<Option<PathBuf>, AppError> {
        let outcome = rotate(&self.log_path, &self.archive_dir, self.max_size_kb, now, self.sink.as_ref());
        report(&self.log_path, self.max_size_kb, outcome)
    }
}

/// What one rotation check did.
enum Rotation {
    Skipped,
    BelowThreshold(u64),
    Archived(PathBuf),
}

/// Size in whole KB, rounded up.
pub fn size_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

/// Archive name for a rotation happening at `now`.
pub fn archive_file_name(now: &DateTime<Local>) -> String {
    format!("{ARCHIVE_PREFIX}{}.zip", now.format(ARCHIVE_TIMESTAMP_FORMAT))
}

/// Archive and truncate `log_path` if it is larger than `max_size_kb`.
///
/// A missing log file is a no-op.
pub fn maybe_archive(
    log_path: &Path,
    archive_dir: &Path,
    max_size_kb: u64,
) -> Result<Option<PathBuf>, AppError> {
    maybe_archive_at(log_path, archive_dir, max_size_kb, Local::now())
}

/// [`maybe_archive`] with an explicit clock.
pub fn maybe_archive_at(
    log_path: &Path,
    archive_dir: &Path,
    max_size_kb: u64,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>, AppError> {
    report(log_path, max_size_kb, rotate(log_path, archive_dir, max_size_kb, now, None))
}

// Logging happens here, after any sink lock taken by `rotate` is released.
fn report(
    log_path: &Path,
    max_size_kb: u64,
    outcome: Result<Rotation, AppError>,
) -> Result<Option<PathBuf>, AppError> {
    match outcome? {
        Rotation::Skipped => Ok(None),
        Rotation::BelowThreshold(size_kb) => {
            debug!(log = %log_path.display(), size_kb, max_size_kb, "log below rotation threshold");
            Ok(None)
        }
        Rotation::Archived(archive_path) => {
            info!("Archived log file to {}", archive_path.display());
            Ok(Some(archive_path))
        }
    }
}

// Must not log: the caller's sink lock may be held.
fn rotate(
    log_path: &Path,
    archive_dir: &Path,
    max_size_kb: u64,
    now: DateTime<Local>,
    sink: Option<&LogSink>,
) -> Result<Rotation, AppError> {
    let held = sink.map(LogSink::lock);

    let metadata = match fs::metadata(log_path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Ok(Rotation::Skipped),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Rotation::Skipped),
        Err(e) => {
            return Err(AppError::Archive(format!("cannot stat {}: {e}", log_path.display())));
        }
    };

    let current_kb = size_kb(metadata.len());
    if current_kb <= max_size_kb {
        return Ok(Rotation::BelowThreshold(current_kb));
    }

    fs::create_dir_all(archive_dir).map_err(|e| {
        AppError::Archive(format!("cannot create {}: {e}", archive_dir.display()))
    })?;

    let file_name = archive_file_name(&now);
    let archive_path = archive_dir.join(&file_name);
    if archive_path.exists() {
        return Err(AppError::Archive(format!(
            "{} already exists, rotation skipped",
            archive_path.display()
        )));
    }

    let entry_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Archive(format!("{} has no file name", log_path.display())))?;

    let contents = fs::read(log_path)
        .map_err(|e| AppError::Archive(format!("cannot read {}: {e}", log_path.display())))?;

    let partial_path = archive_dir.join(format!(".{file_name}.partial"));
    let written = write_archive(&partial_path, &entry_name, &contents).and_then(|()| {
        fs::rename(&partial_path, &archive_path).map_err(|e| {
            AppError::Archive(format!("cannot move archive into {}: {e}", archive_path.display()))
        })
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&partial_path);
        return Err(e);
    }

    let truncated = match held {
        Some(file) => file.set_len(0),
        None => OpenOptions::new().write(true).truncate(true).open(log_path).map(drop),
    };
    truncated.map_err(|e| AppError::Archive(format!("cannot truncate {}: {e}", log_path.display())))?;

    Ok(Rotation::Archived(archive_path))
}

fn write_archive(path: &Path, entry_name: &str, contents: &[u8]) -> Result<(), AppError> {
    let err = |e: &dyn std::fmt::Display| AppError::Archive(format!("write {}: {e}", path.display()));

    let file = File::create(path).map_err(|e| err(&e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options).map_err(|e| err(&e))?;
    zip.write_all(contents).map_err(|e| err(&e))?;
    let file = zip.finish().map_err(|e| err(&e))?;
    file.sync_all().map_err(|e| err(&e))?;
    Ok(())
}
