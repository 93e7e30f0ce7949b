//! Docs subsystem: the support corpus, its persisted index, and the
//! retriever that answers questions from it.
//!
//! - [`builder`] turns `paths.doc_dir` into an index and swaps it into
//!   `paths.persist_dir`.
//! - [`index`] is the on-disk store (SQLite FTS5 + document bodies).
//! - [`retriever`] loads the persisted index per query and asks the LLM.

pub mod builder;
pub mod index;
pub mod retriever;

pub use builder::{BuildSummary, IndexBuilder};
pub use index::DocIndex;
pub use retriever::{DocsRetriever, RetrievalCollaborator};

use thiserror::Error;

/// Failures surfaced by a retrieval query. Each maps to a fixed,
/// user-facing reply in the chat controller.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("retrieval failed: {0}")]
    UnknownFailure(String),
}

/// Payload-free classification of a [`RetrievalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalErrorKind {
    IndexNotFound,
    MalformedQuery,
    BackendUnavailable,
    UnknownFailure,
}

impl RetrievalError {
    pub fn kind(&self) -> RetrievalErrorKind {
        match self {
            Self::IndexNotFound(_) => RetrievalErrorKind::IndexNotFound,
            Self::MalformedQuery(_) => RetrievalErrorKind::MalformedQuery,
            Self::BackendUnavailable(_) => RetrievalErrorKind::BackendUnavailable,
            Self::UnknownFailure(_) => RetrievalErrorKind::UnknownFailure,
        }
    }
}

impl From<crate::llm::ProviderError> for RetrievalError {
    fn from(e: crate::llm::ProviderError) -> Self {
        use crate::llm::ProviderError;
        match e {
            ProviderError::Unavailable(m) => Self::BackendUnavailable(m),
            ProviderError::Rejected(m) => Self::MalformedQuery(m),
            other => Self::UnknownFailure(other.to_string()),
        }
    }
}

/// Failures of an index rebuild.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    /// The doc directory is missing or holds no readable documents.
    #[error("no documents found in {0}")]
    EmptyCorpus(String),

    #[error("index build failed: {0}")]
    IndexBuildFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderError;

    #[test]
    fn provider_errors_map_to_retrieval_kinds() {
        let kind = |e: ProviderError| RetrievalError::from(e).kind();
        assert_eq!(kind(ProviderError::Unavailable("x".into())), RetrievalErrorKind::BackendUnavailable);
        assert_eq!(kind(ProviderError::Rejected("x".into())), RetrievalErrorKind::MalformedQuery);
        assert_eq!(kind(ProviderError::Request("x".into())), RetrievalErrorKind::UnknownFailure);
        assert_eq!(kind(ProviderError::UnknownProvider("x".into())), RetrievalErrorKind::UnknownFailure);
    }
}
