//! Retrieval collaborator: question in, answer text out.

use std::future::Future;
use std::path::PathBuf;

use tracing::debug;

use super::RetrievalError;
use super::index::{DocIndex, SearchResult, fts_query};
use crate::llm::LlmProvider;

const SYSTEM_PROMPT: &str = "You are a customer support assistant. Answer the question using only the \
provided context. If the context does not contain the answer, say that you do not know.";

/// Anything that can answer a support question from the corpus.
///
/// The chat controller is generic over this so tests can substitute a stub.
pub trait RetrievalCollaborator: Send + Sync {
    fn query(&self, question: &str) -> impl Future<Output = Result<String, RetrievalError>> + Send;
}

/// Retriever over the persisted [`DocIndex`].
///
/// The index is loaded fresh on every query, so a rebuild is visible to
/// the very next question without restarting.
#[derive(Debug, Clone)]
pub struct DocsRetriever {
    persist_dir: PathBuf,
    llm: LlmProvider,
    top_k: usize,
}

impl DocsRetriever {
    pub fn new(persist_dir: impl Into<PathBuf>, llm: LlmProvider, top_k: usize) -> Self {
        Self { persist_dir: persist_dir.into(), llm, top_k }
    }

    /// Load the index and return the best `top_k` passages for `question`.
    pub async fn passages(&self, question: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        let dir = self.persist_dir.clone();
        let question = question.to_string();
        let top_k = self.top_k;

        tokio::task::spawn_blocking(move || {
            let index = DocIndex::load(&dir)?;
            let expr = fts_query(&question).ok_or_else(|| {
                RetrievalError::MalformedQuery("query has no searchable terms".to_string())
            })?;
            index
                .search_by_text(&expr, top_k)
                .map_err(|e| RetrievalError::UnknownFailure(e.to_string()))
        })
        .await
        .map_err(|e| RetrievalError::UnknownFailure(format!("search task failed: {e}")))?
    }
}

impl RetrievalCollaborator for DocsRetriever {
    async fn query(&self, question: &str) -> Result<String, RetrievalError> {
        let passages = self.passages(question).await?;
        debug!(passages = passages.len(), provider = self.llm.name(), "querying llm");
        let prompt = build_prompt(&passages, question);
        Ok(self.llm.complete(&prompt, Some(SYSTEM_PROMPT)).await?)
    }
}

fn build_prompt(passages: &[SearchResult], question: &str) -> String {
    let mut prompt = String::from("Context:\n");
    if passages.is_empty() {
        prompt.push_str("(no matching documents)\n");
    }
    for (i, p) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n{}\n\n", i + 1, p.source, p.chunk.text.trim()));
    }
    prompt.push_str(&format!("Question: {question}\nAnswer:"));
    prompt
}
