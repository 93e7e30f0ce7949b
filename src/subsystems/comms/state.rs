//! Shared state for the comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and only see the typed operations
//! below: run a chat turn, read or end a session, rebuild the index. The
//! session registry, controller and index lock stay private.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::Config;
use crate::llm::LlmProvider;
use crate::subsystems::chat::{ChatTurnController, TurnOutcome};
use crate::subsystems::docs::builder::status_line;
use crate::subsystems::docs::{BuildSummary, DocsRetriever, IndexBuildError, IndexBuilder};
use crate::subsystems::memory::{ChatMessage, SessionState, SessionStore};

const MAX_SESSION_ID_LEN: usize = 64;

/// Result of one chat turn as seen by a channel.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: String,
    /// Text of the last ai message after the turn.
    pub reply: String,
    #[serde(skip)]
    pub outcome: TurnOutcome,
    pub history: Vec<ChatMessage>,
}

/// Read-only copy of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub token_count: u64,
    pub pending_input: String,
    pub history: Vec<ChatMessage>,
}

impl SessionSnapshot {
    fn fresh(session_id: String) -> Self {
        Self::of(&session_id, &SessionState::new())
    }

    fn of(session_id: &str, state: &SessionState) -> Self {
        Self {
            session_id: session_id.to_string(),
            token_count: state.token_count,
            pending_input: state.pending_input.clone(),
            history: state.history().to_vec(),
        }
    }
}

/// Outcome of a sidebar rebuild, with the line to show the user.
#[derive(Debug)]
pub struct RebuildReport {
    pub result: Result<BuildSummary, IndexBuildError>,
    pub status: &'static str,
}

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    bot_name: String,
    sessions: SessionStore,
    controller: ChatTurnController<DocsRetriever>,
    builder: IndexBuilder,
    /// Queries hold it shared; a rebuild holds it exclusively.
    index_lock: RwLock<()>,
}

impl CommsState {
    pub fn new(config: &Config, llm: LlmProvider) -> Self {
        let retriever = DocsRetriever::new(&config.paths.persist_dir, llm, config.retrieval.top_k);
        let builder = IndexBuilder::new(
            &config.paths.doc_dir,
            &config.paths.persist_dir,
            config.retrieval.chunk_size,
        );
        Self {
            bot_name: config.bot_name.clone(),
            sessions: SessionStore::with_limits(
                config.sessions.max_sessions,
                Duration::from_secs(config.sessions.idle_timeout_secs),
            ),
            controller: ChatTurnController::new(retriever),
            builder,
            index_lock: RwLock::new(()),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of the session for `requested`, or an empty one when it
    /// does not exist yet. An absent or malformed id gets a fresh id. Nothing
    /// is registered until the first turn.
    pub async fn open_session(&self, requested: Option<&str>) -> SessionSnapshot {
        if let Some(snapshot) = match requested {
            Some(id) => self.session_snapshot(id).await,
            None => None,
        } {
            return snapshot;
        }
        SessionSnapshot::fresh(accept_session_id(requested))
    }

    /// Run one chat turn for `session_id` (created on first use).
    ///
    /// The session stays locked for the whole turn, so concurrent submits on
    /// one session are handled strictly one after the other.
    pub async fn send_message(&self, session_id: Option<&str>, text: &str) -> TurnReply {
        let session_id = accept_session_id(session_id);
        let session = self.sessions.ensure_initialized(&session_id);
        let mut state = session.lock().await;

        let outcome = {
            let _index = self.index_lock.read().await;
            state.pending_input = text.to_string();
            self.controller.handle(text, &mut state).await
        };
        info!(%session_id, ?outcome, history = state.history().len(), "turn handled");

        TurnReply {
            reply: state.last_message().map(|m| m.text().to_string()).unwrap_or_default(),
            outcome,
            history: state.history().to_vec(),
            session_id,
        }
    }

    pub async fn session_snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.sessions.get(session_id)?;
        let state = session.lock().await;
        Some(SessionSnapshot::of(session_id, &state))
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.end_session(session_id)
    }

    /// Rebuild the persisted index from the doc directory. Waits for
    /// in-flight queries to finish and blocks new ones until done.
    pub async fn rebuild_index(&self) -> RebuildReport {
        let _index = self.index_lock.write().await;
        let builder = self.builder.clone();
        let result = match tokio::task::spawn_blocking(move || builder.rebuild()).await {
            Ok(r) => r,
            Err(e) => Err(IndexBuildError::IndexBuildFailure(format!("rebuild task failed: {e}"))),
        };
        if let Err(e) = &result {
            error!("index rebuild failed: {e}");
        }
        RebuildReport { status: status_line(&result), result }
    }
}

/// Keep a client-supplied session id only if it looks like one we issued.
fn accept_session_id(requested: Option<&str>) -> String {
    match requested {
        Some(id)
            if !id.is_empty()
                && id.len() <= MAX_SESSION_ID_LEN
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') =>
        {
            id.to_string()
        }
        _ => SessionStore::new_session_id(),
    }
}
