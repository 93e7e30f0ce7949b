//! One chat turn: validate the input, answer it, append the pair.
//!
//! ```text
//! Idle → Validating ─┬→ SpecialCase ─┐
//!                    └→ Retrieving ──┴→ Appending → Idle
//! ```
//!
//! Every path through [`ChatTurnController::handle`] appends either nothing
//! (duplicate submit) or exactly one human/ai pair. Retrieval failures become
//! a fixed ai reply; raw error text only goes to the log.

use std::backtrace::Backtrace;

use tracing::{debug, error, warn};

use super::special::SpecialReplyTable;
use crate::subsystems::docs::{RetrievalCollaborator, RetrievalErrorKind};
use crate::subsystems::memory::SessionState;

pub const EMPTY_INPUT_HUMAN: &str = "[Empty Input]";
pub const EMPTY_INPUT_REPLY: &str = "You didn't enter any query. Please provide a valid input.";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input repeated the last history entry; nothing appended.
    Duplicate,
    EmptyInput,
    SpecialCase,
    Answered,
    /// Retrieval failed; the ai reply is the fixed message for this kind.
    Fallback(RetrievalErrorKind),
}

impl TurnOutcome {
    pub fn appended(&self) -> bool {
        !matches!(self, TurnOutcome::Duplicate)
    }
}

/// User-facing reply for a failed retrieval.
pub fn fallback_reply(kind: RetrievalErrorKind) -> &'static str {
    match kind {
        RetrievalErrorKind::IndexNotFound => {
            "The index file was not found. Please check the system configuration."
        }
        RetrievalErrorKind::MalformedQuery => {
            "There was an issue with the value provided. Please try again."
        }
        RetrievalErrorKind::BackendUnavailable => "A runtime error occurred. Please try again later.",
        RetrievalErrorKind::UnknownFailure => "An unexpected error occurred. Please try again.",
    }
}

pub struct ChatTurnController<R> {
    retriever: R,
    specials: SpecialReplyTable,
}

impl<R: RetrievalCollaborator> ChatTurnController<R> {
    pub fn new(retriever: R) -> Self {
        Self { retriever, specials: SpecialReplyTable }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    /// Run one turn against `session`.
    ///
    /// The caller must hold the session exclusively for the whole call.
    pub async fn handle(&self, raw_input: &str, session: &mut SessionState) -> TurnOutcome {
        // Literal comparison against the last entry, whatever its origin.
        if session.last_message().is_some_and(|m| m.text() == raw_input) {
            debug!("duplicate submit ignored");
            return TurnOutcome::Duplicate;
        }

        let trimmed = raw_input.trim();

        let outcome = if trimmed.is_empty() {
            warn!("Empty input received");
            session.push_turn(EMPTY_INPUT_HUMAN, EMPTY_INPUT_REPLY);
            TurnOutcome::EmptyInput
        } else if let Some(reply) = self.specials.lookup(trimmed) {
            warn!(input = trimmed, "Special case input received");
            session.push_turn(trimmed, reply);
            TurnOutcome::SpecialCase
        } else {
            match self.retriever.query(trimmed).await {
                Ok(answer) => {
                    session.push_turn(trimmed, answer);
                    TurnOutcome::Answered
                }
                Err(e) => {
                    let kind = e.kind();
                    let backtrace = Backtrace::force_capture();
                    error!(?kind, %backtrace, "retrieval failed: {e:?}");
                    session.push_turn(trimmed, fallback_reply(kind));
                    TurnOutcome::Fallback(kind)
                }
            }
        };

        session.pending_input.clear();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::docs::RetrievalError;
    use crate::subsystems::memory::{ChatMessage, Origin};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results and records every question it was asked.
    #[derive(Default)]
    struct ScriptedRetriever {
        replies: Mutex<VecDeque<Result<String, RetrievalError>>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedRetriever {
        fn with(replies: Vec<Result<String, RetrievalError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), asked: Mutex::default() }
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl RetrievalCollaborator for ScriptedRetriever {
        async fn query(&self, question: &str) -> Result<String, RetrievalError> {
            self.asked.lock().unwrap().push(question.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("answer to {question}")))
        }
    }

    fn pairs(state: &SessionState) -> Vec<(Origin, &str)> {
        state.history().iter().map(|m: &ChatMessage| (m.origin(), m.text())).collect()
    }

    #[tokio::test]
    async fn answered_turn_appends_trimmed_pair() {
        let ctl = ChatTurnController::new(ScriptedRetriever::default());
        let mut state = SessionState::new();
        state.pending_input = "  where is my order  ".into();

        let outcome = ctl.handle("  where is my order  ", &mut state).await;

        assert_eq!(outcome, TurnOutcome::Answered);
        assert_eq!(
            pairs(&state),
            vec![(Origin::Human, "where is my order"), (Origin::Ai, "answer to where is my order")]
        );
        assert_eq!(state.pending_input, "");
        assert_eq!(ctl.retriever().asked(), vec!["where is my order"]);
    }

    #[tokio::test]
    async fn duplicate_of_last_entry_is_noop() {
        let ctl = ChatTurnController::new(ScriptedRetriever::default());
        let mut state = SessionState::new();
        ctl.handle("hi", &mut state).await;
        let before = state.history().to_vec();

        // Last entry is the ai reply, so that is what a repeat must match.
        let outcome = ctl.handle("Hello! How can I assist you today?", &mut state).await;

        assert_eq!(outcome, TurnOutcome::Duplicate);
        assert_eq!(state.history(), before.as_slice());
        assert!(ctl.retriever().asked().is_empty());
    }

    #[tokio::test]
    async fn repeating_human_text_is_not_a_duplicate() {
        let ctl = ChatTurnController::new(ScriptedRetriever::default());
        let mut state = SessionState::new();
        ctl.handle("hi", &mut state).await;
        assert_eq!(ctl.handle("hi", &mut state).await, TurnOutcome::SpecialCase);
        assert_eq!(state.history().len(), 4);
    }

    #[tokio::test]
    async fn whitespace_input_appends_empty_pair() {
        let ctl = ChatTurnController::new(ScriptedRetriever::default());
        let mut state = SessionState::new();

        assert_eq!(ctl.handle("   ", &mut state).await, TurnOutcome::EmptyInput);
        assert_eq!(
            pairs(&state),
            vec![(Origin::Human, EMPTY_INPUT_HUMAN), (Origin::Ai, EMPTY_INPUT_REPLY)]
        );
        assert!(ctl.retriever().asked().is_empty());
    }

    #[tokio::test]
    async fn special_case_is_exact() {
        let ctl = ChatTurnController::new(ScriptedRetriever::default());
        let mut state = SessionState::new();

        assert_eq!(ctl.handle("hi", &mut state).await, TurnOutcome::SpecialCase);
        assert_eq!(
            pairs(&state),
            vec![(Origin::Human, "hi"), (Origin::Ai, "Hello! How can I assist you today?")]
        );

        assert_eq!(ctl.handle("Hi", &mut state).await, TurnOutcome::Answered);
        assert_eq!(ctl.retriever().asked(), vec!["Hi"]);
    }

    #[tokio::test]
    async fn retrieval_errors_become_fixed_replies() {
        let secret = "sqlite said: disk I/O error at /var/secret";
        let ctl = ChatTurnController::new(ScriptedRetriever::with(vec![
            Err(RetrievalError::IndexNotFound(secret.into())),
            Err(RetrievalError::MalformedQuery(secret.into())),
            Err(RetrievalError::BackendUnavailable(secret.into())),
            Err(RetrievalError::UnknownFailure(secret.into())),
        ]));
        let mut state = SessionState::new();

        let kinds = [
            RetrievalErrorKind::IndexNotFound,
            RetrievalErrorKind::MalformedQuery,
            RetrievalErrorKind::BackendUnavailable,
            RetrievalErrorKind::UnknownFailure,
        ];
        for (i, kind) in kinds.into_iter().enumerate() {
            let outcome = ctl.handle(&format!("question {i}"), &mut state).await;
            assert_eq!(outcome, TurnOutcome::Fallback(kind));
            assert_eq!(state.history().len(), 2 * (i + 1));
            let reply = state.last_message().unwrap();
            assert_eq!(reply.origin(), Origin::Ai);
            assert_eq!(reply.text(), fallback_reply(kind));
            assert!(!reply.text().contains("sqlite"));
        }
    }

    #[tokio::test]
    async fn retrieval_failure_is_logged_with_detail_and_backtrace() {
        use crate::logger::{LineFormat, LogSink};

        let tmp = tempfile::TempDir::new().unwrap();
        let sink = LogSink::open(&tmp.path().join("app.log")).unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_ansi(false)
            .event_format(LineFormat)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let ctl = ChatTurnController::new(ScriptedRetriever::with(vec![Err(
            RetrievalError::BackendUnavailable("connection refused".into()),
        )]));
        ctl.handle("where is my order", &mut SessionState::new()).await;

        let log = std::fs::read_to_string(sink.path()).unwrap();
        assert!(log.contains(" - ERROR - retrieval failed: BackendUnavailable(\"connection refused\")"));
        assert!(log.contains("backtrace="));
    }

    #[tokio::test]
    async fn history_stays_even_and_bounded() {
        let ctl = ChatTurnController::new(ScriptedRetriever::with(vec![Err(
            RetrievalError::BackendUnavailable("down".into()),
        )]));
        let mut state = SessionState::new();
        let inputs = ["q1", "", "hi", "hi", "Hello! How can I assist you today?", "  ", "q2", "0"];

        for (n, input) in inputs.iter().enumerate() {
            let before = state.history().len();
            let outcome = ctl.handle(input, &mut state).await;
            let grew = state.history().len() - before;
            assert_eq!(grew, if outcome.appended() { 2 } else { 0 });
            assert_eq!(state.history().len() % 2, 0);
            assert!(state.history().len() <= 2 * (n + 1));
        }
    }
}
