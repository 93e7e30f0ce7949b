//! `DocIndex`: persisted document + chunk index for retrieval.
//!
//! ```text
//! {index_dir}/
//! ├── chunks.db        doc_metadata table + FTS5 `chunks` table
//! └── docs/
//!     └── {doc_id}.txt document bodies
//! ```
//!
//! Documents are deduplicated by SHA-256 of their content. Search is FTS5
//! BM25 over fixed-size chunks.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use super::RetrievalError;

const DOCS_DIR: &str = "docs";
const DB_FILENAME: &str = "chunks.db";
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct DocIndex {
    dir: PathBuf,
    docs_dir: PathBuf,
    db_path: PathBuf,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: String,
    pub content: String,
    pub content_hash: String,
    pub created_at: String,
}

impl Document {
    /// New document; id, hash and timestamp are filled in on insert.
    pub fn new(title: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            source: source.into(),
            content: content.into(),
            content_hash: String::new(),
            created_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DocSummary {
    pub doc_id: String,
    pub title: String,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    /// Byte offset of the chunk within its document.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Negated BM25 rank: higher is better.
    pub score: f32,
    pub title: String,
    pub source: String,
}

impl DocIndex {
    /// Create (or reopen) an index rooted at `dir`.
    pub fn create(dir: &Path) -> Result<Self, AppError> {
        let index = Self::at(dir);
        fs::create_dir_all(&index.docs_dir).map_err(|e| {
            AppError::Index(format!("docindex: cannot create {}: {e}", index.docs_dir.display()))
        })?;
        index.init_db()?;
        Ok(index)
    }

    /// Open an existing, fully initialised index.
    pub fn load(dir: &Path) -> Result<Self, RetrievalError> {
        let index = Self::at(dir);
        if !index.db_path.is_file() {
            return Err(RetrievalError::IndexNotFound(format!(
                "no index at {}",
                dir.display()
            )));
        }
        let conn = index
            .open_conn()
            .map_err(|e| RetrievalError::IndexNotFound(e.to_string()))?;
        let version = schema_version(&conn).map_err(|e| RetrievalError::IndexNotFound(e.to_string()))?;
        if version != SCHEMA_VERSION {
            return Err(RetrievalError::IndexNotFound(format!(
                "index at {} has schema version {version}, expected {SCHEMA_VERSION}",
                dir.display()
            )));
        }
        Ok(index)
    }

    pub(super) fn at(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            docs_dir: dir.join(DOCS_DIR),
            db_path: dir.join(DB_FILENAME),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.dir
    }

    /// Insert a document, returning its id. Identical content returns the
    /// id of the document already stored.
    pub fn add_document(&self, mut doc: Document) -> Result<String, AppError> {
        if doc.id.is_empty() {
            doc.id = uuid::Uuid::now_v7().to_string();
        }
        if doc.content_hash.is_empty() {
            doc.content_hash = sha256_hex(&doc.content);
        }
        if doc.created_at.is_empty() {
            doc.created_at = now_iso8601();
        }

        let conn = self.open_conn()?;
        if let Some(existing_id) = find_doc_id_by_hash(&conn, &doc.content_hash)? {
            return Ok(existing_id);
        }

        conn.execute(
            "INSERT INTO doc_metadata (doc_id, title, source, content_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![doc.id, doc.title, doc.source, doc.content_hash, doc.created_at],
        )
        .map_err(|e| AppError::Index(format!("docindex: insert metadata: {e}")))?;

        fs::write(self.doc_content_path(&doc.id), doc.content).map_err(|e| {
            AppError::Index(format!("docindex: write document content for {}: {e}", doc.id))
        })?;

        Ok(doc.id)
    }

    pub fn list_documents(&self) -> Result<Vec<DocSummary>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT doc_id, title, source, created_at FROM doc_metadata ORDER BY title")
            .map_err(|e| AppError::Index(format!("docindex: prepare list_documents: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DocSummary {
                    doc_id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| AppError::Index(format!("docindex: query list_documents: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Index(format!("docindex: map list_documents row: {e}")))
    }

    /// Split a stored document into chunks of roughly `chunk_size` bytes,
    /// cut on char boundaries. Whitespace-only chunks are dropped.
    pub fn chunk_document(&self, doc_id: &str, chunk_size: usize) -> Result<Vec<Chunk>, AppError> {
        if chunk_size == 0 {
            return Err(AppError::Index("docindex: chunk_size must be > 0".to_string()));
        }

        let content = fs::read_to_string(self.doc_content_path(doc_id)).map_err(|e| {
            AppError::Index(format!("docindex: read document content for {doc_id}: {e}"))
        })?;

        let mut chunks = Vec::new();
        let mut push = |start: usize, end: usize| {
            let text = &content[start..end];
            if !text.trim().is_empty() {
                chunks.push(Chunk {
                    id: uuid::Uuid::now_v7().to_string(),
                    doc_id: doc_id.to_string(),
                    text: text.to_string(),
                    position: start,
                });
            }
        };

        let mut start = 0usize;
        for (idx, ch) in content.char_indices() {
            let end = idx + ch.len_utf8();
            if end - start >= chunk_size {
                push(start, end);
                start = end;
            }
        }
        if start < content.len() {
            push(start, content.len());
        }

        Ok(chunks)
    }

    /// Replace the indexed chunks of every document present in `chunks`.
    pub fn index_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, AppError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("docindex: begin index tx: {e}")))?;

        let doc_ids: HashSet<&str> = chunks.iter().map(|c| c.doc_id.as_str()).collect();
        for doc_id in doc_ids {
            tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
                .map_err(|e| {
                    AppError::Index(format!("docindex: clear chunks for {doc_id} before reindex: {e}"))
                })?;
        }

        for chunk in &chunks {
            tx.execute(
                "INSERT INTO chunks (id, doc_id, text, position) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id, chunk.doc_id, chunk.text, chunk.position as i64],
            )
            .map_err(|e| AppError::Index(format!("docindex: insert chunk: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("docindex: commit index tx: {e}")))?;
        Ok(chunks.len())
    }

    /// BM25-ranked search. `match_expr` is an FTS5 expression; build one
    /// from free text with [`fts_query`].
    pub fn search_by_text(&self, match_expr: &str, top_k: usize) -> Result<Vec<SearchResult>, AppError> {
        if match_expr.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT
                    chunks.id,
                    chunks.doc_id,
                    chunks.text,
                    chunks.position,
                    bm25(chunks) AS rank,
                    doc_metadata.title,
                    doc_metadata.source
                 FROM chunks
                 JOIN doc_metadata ON doc_metadata.doc_id = chunks.doc_id
                 WHERE chunks MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Index(format!("docindex: prepare search_by_text: {e}")))?;

        let rows = stmt
            .query_map(params![match_expr, top_k as i64], |row| {
                let bm25_score: f64 = row.get(4)?;
                Ok(SearchResult {
                    chunk: Chunk {
                        id: row.get(0)?,
                        doc_id: row.get(1)?,
                        text: row.get(2)?,
                        position: row.get::<_, i64>(3)? as usize,
                    },
                    score: (-bm25_score) as f32,
                    title: row.get(5)?,
                    source: row.get(6)?,
                })
            })
            .map_err(|e| AppError::Index(format!("docindex: execute search_by_text: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Index(format!("docindex: map search row: {e}")))
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version = schema_version(&conn)?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS doc_metadata (
                    doc_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    source TEXT NOT NULL,
                    content_hash TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS chunks USING fts5(
                    id UNINDEXED,
                    doc_id UNINDEXED,
                    text,
                    position UNINDEXED
                );

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Index(format!("docindex: initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Index(format!(
                "docindex: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Index(format!("docindex: open {}: {e}", self.db_path.display())))?;

        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Index(format!("docindex: set busy_timeout: {e}")))?;

        Ok(conn)
    }

    fn doc_content_path(&self, doc_id: &str) -> PathBuf {
        self.docs_dir.join(format!("{doc_id}.txt"))
    }
}

/// Turn free text into an FTS5 expression: every alphanumeric run becomes a
/// quoted term, OR-joined. Returns `None` when nothing searchable remains.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn schema_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|e| AppError::Index(format!("docindex: read schema version: {e}")))
}

fn find_doc_id_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<String>, AppError> {
    match conn.query_row(
        "SELECT doc_id FROM doc_metadata WHERE content_hash = ?1",
        params![content_hash],
        |row| row.get::<_, String>(0),
    ) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Index(format!("docindex: find by hash: {e}"))),
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_index() -> (TempDir, DocIndex) {
        let temp = TempDir::new().expect("tempdir");
        let index = DocIndex::create(&temp.path().join("storage")).expect("create index");
        (temp, index)
    }

    #[test]
    fn add_document_deduplicates_by_hash() {
        let (_temp, index) = make_index();
        let first_id = index.add_document(Document::new("A", "a.txt", "alpha beta gamma")).unwrap();
        let second_id = index.add_document(Document::new("B", "b.txt", "alpha beta gamma")).unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(index.list_documents().unwrap().len(), 1);
    }

    #[test]
    fn chunk_and_search_returns_ranked_results() {
        let (_temp, index) = make_index();
        let doc_id = index
            .add_document(Document::new(
                "Rust Search",
                "rust.md",
                "rust async memory store with bm25 search and chunk indexing",
            ))
            .unwrap();
        let chunks = index.chunk_document(&doc_id, 20).unwrap();
        assert!(!chunks.is_empty());
        index.index_chunks(chunks).unwrap();

        let results = index.search_by_text("\"bm25\"", 5).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.doc_id, doc_id);
        assert_eq!(results[0].source, "rust.md");
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let (_temp, index) = make_index();
        let doc_id = index.add_document(Document::new("U", "u.txt", "héllo wörld ünïcode")).unwrap();
        let chunks = index.chunk_document(&doc_id, 3).unwrap();
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect::<String>();
        assert_eq!(rebuilt.replace(' ', ""), "héllowörldünïcode");
    }

    #[test]
    fn reindexing_replaces_old_chunks() {
        let (_temp, index) = make_index();
        let doc_id = index.add_document(Document::new("R", "r.txt", "needle in a haystack")).unwrap();
        let chunks = index.chunk_document(&doc_id, 1000).unwrap();
        index.index_chunks(chunks.clone()).unwrap();
        index.index_chunks(chunks).unwrap();
        assert_eq!(index.search_by_text("\"needle\"", 10).unwrap().len(), 1);
    }

    #[test]
    fn load_missing_index_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = DocIndex::load(&temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, RetrievalError::IndexNotFound(_)));
    }

    #[test]
    fn load_existing_index_succeeds() {
        let (_temp, index) = make_index();
        let loaded = DocIndex::load(index.root_dir()).unwrap();
        assert_eq!(loaded.root_dir(), index.root_dir());
    }

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(fts_query("what's NEW?").as_deref(), Some("\"what\" OR \"s\" OR \"NEW\""));
        assert_eq!(fts_query("  ?!  "), None);
        assert_eq!(fts_query(""), None);
    }
}
