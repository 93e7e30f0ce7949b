//! Index builder: doc directory in, persisted index out.
//!
//! A rebuild always happens in a staging directory next to the persist dir.
//! The live index is only replaced once the new one is complete, so a failed
//! build leaves the previous index serving queries.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::IndexBuildError;
use super::index::{DocIndex, Document};

/// Sidebar line shown after a successful rebuild.
pub const STATUS_CREATED: &str = "Context Created:";
/// Sidebar line shown when the doc directory holds nothing to index.
pub const STATUS_EMPTY_CORPUS: &str = "Error: No files found in data directory. Check the log for details.";
/// Sidebar line shown for any other rebuild failure.
pub const STATUS_FAILED: &str = "An unexpected error occurred. Check the log for details.";

/// Counts reported by a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BuildSummary {
    pub documents: usize,
    pub chunks: usize,
}

/// Sidebar status line for a rebuild outcome.
pub fn status_line(result: &Result<BuildSummary, IndexBuildError>) -> &'static str {
    match result {
        Ok(_) => STATUS_CREATED,
        Err(IndexBuildError::EmptyCorpus(_)) => STATUS_EMPTY_CORPUS,
        Err(IndexBuildError::IndexBuildFailure(_)) => STATUS_FAILED,
    }
}

/// Rebuilds `persist_dir` from the documents under `doc_dir`.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    doc_dir: PathBuf,
    persist_dir: PathBuf,
    chunk_size: usize,
}

impl IndexBuilder {
    pub fn new(doc_dir: impl Into<PathBuf>, persist_dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            doc_dir: doc_dir.into(),
            persist_dir: persist_dir.into(),
            chunk_size,
        }
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// Build a fresh index and swap it into place. Blocking; call from
    /// `spawn_blocking` in async contexts.
    pub fn rebuild(&self) -> Result<BuildSummary, IndexBuildError> {
        let staging = staging_dir(&self.persist_dir);
        let (index, summary) = match build_index(&self.doc_dir, &staging, self.chunk_size) {
            Ok(built) => built,
            Err(e) => {
                remove_stale(&staging);
                return Err(e);
            }
        };
        if let Err(e) = persist_index(index, &self.persist_dir) {
            remove_stale(&staging);
            return Err(e);
        }
        info!("Context Created");
        Ok(summary)
    }
}

/// Index every readable file under `doc_dir` into a new index at `index_dir`.
///
/// `index_dir` is wiped first. Hidden files and directories are skipped, as
/// are files that are not valid UTF-8. A missing `doc_dir` or one with no
/// readable files is [`IndexBuildError::EmptyCorpus`].
pub fn build_index(
    doc_dir: &Path,
    index_dir: &Path,
    chunk_size: usize,
) -> Result<(DocIndex, BuildSummary), IndexBuildError> {
    if !doc_dir.is_dir() {
        return Err(IndexBuildError::EmptyCorpus(doc_dir.display().to_string()));
    }

    let documents = read_corpus(doc_dir)?;
    if documents.is_empty() {
        return Err(IndexBuildError::EmptyCorpus(doc_dir.display().to_string()));
    }

    if index_dir.exists() {
        fs::remove_dir_all(index_dir).map_err(|e| {
            IndexBuildError::IndexBuildFailure(format!("clear {}: {e}", index_dir.display()))
        })?;
    }
    let index = DocIndex::create(index_dir).map_err(failure)?;

    let mut summary = BuildSummary { documents: 0, chunks: 0 };
    for doc in documents {
        let source = doc.source.clone();
        let doc_id = index.add_document(doc).map_err(failure)?;
        let chunks = index.chunk_document(&doc_id, chunk_size).map_err(failure)?;
        let n = index.index_chunks(chunks).map_err(failure)?;
        debug!(%source, chunks = n, "document indexed");
        summary.documents += 1;
        summary.chunks += n;
    }

    info!(documents = summary.documents, chunks = summary.chunks, "index built");
    Ok((index, summary))
}

/// Move a built index to `dest`, replacing whatever index was there.
///
/// The old index is renamed aside first and only deleted once the new one
/// is in place; if the swap fails it is moved back.
pub fn persist_index(index: DocIndex, dest: &Path) -> Result<DocIndex, IndexBuildError> {
    let src = index.root_dir().to_path_buf();
    if src == dest {
        return Ok(index);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            IndexBuildError::IndexBuildFailure(format!("create {}: {e}", parent.display()))
        })?;
    }

    let backup = sibling(dest, "previous");
    remove_stale(&backup);
    let had_previous = dest.exists();
    if had_previous {
        info!("Creating context...");
        fs::rename(dest, &backup).map_err(|e| {
            IndexBuildError::IndexBuildFailure(format!("move old index {} aside: {e}", dest.display()))
        })?;
    }

    if let Err(e) = fs::rename(&src, dest) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, dest) {
                warn!(index = %dest.display(), "failed to restore previous index: {restore}");
            }
        }
        return Err(IndexBuildError::IndexBuildFailure(format!(
            "move {} to {}: {e}",
            src.display(),
            dest.display()
        )));
    }

    remove_stale(&backup);
    Ok(DocIndex::at(dest))
}

fn read_corpus(doc_dir: &Path) -> Result<Vec<Document>, IndexBuildError> {
    let mut documents = Vec::new();
    let walker = WalkDir::new(doc_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| IndexBuildError::IndexBuildFailure(format!("walk: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(doc_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        match fs::read_to_string(path) {
            Ok(content) => documents.push(Document::new(rel.clone(), rel, content)),
            Err(e) => warn!(file = %path.display(), "skipping unreadable document: {e}"),
        }
    }
    Ok(documents)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn staging_dir(persist_dir: &Path) -> PathBuf {
    sibling(persist_dir, "building")
}

/// Hidden `.<name>.<suffix>` next to `dir`.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!(".{name}.{suffix}"))
}

fn remove_stale(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), "failed to remove staging index: {e}");
        }
    }
}

fn failure(e: crate::error::AppError) -> IndexBuildError {
    IndexBuildError::IndexBuildFailure(e.to_string())
}
