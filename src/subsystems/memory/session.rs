//! Per-session chat state.
//!
//! History only grows through [`SessionState::push_turn`], which appends a
//! human/ai pair in one call. A completed session therefore always holds an
//! even number of messages in arrival order.

use serde::Serialize;

/// Who produced a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Human,
    Ai,
}

/// One immutable chat bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    origin: Origin,
    text: String,
}

impl ChatMessage {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self { origin, text: text.into() }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Mutable state owned by one user session.
#[derive(Debug, Default, Serialize)]
pub struct SessionState {
    history: Vec<ChatMessage>,
    /// Reserved; nothing increments it yet.
    pub token_count: u64,
    /// Uncommitted text in the input box.
    pub pending_input: String,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.history.last()
    }

    /// Append a completed turn: the human message followed by the ai reply.
    pub fn push_turn(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.history.reserve(2);
        self.history.push(ChatMessage::new(Origin::Human, human));
        self.history.push(ChatMessage::new(Origin::Ai, ai));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_defaults() {
        let state = SessionState::new();
        assert!(state.history().is_empty());
        assert!(state.last_message().is_none());
        assert_eq!(state.token_count, 0);
        assert_eq!(state.pending_input, "");
    }

    #[test]
    fn push_turn_appends_human_then_ai() {
        let mut state = SessionState::new();
        state.push_turn("first", "one");
        state.push_turn("second", "two");

        let origins: Vec<Origin> = state.history().iter().map(ChatMessage::origin).collect();
        assert_eq!(origins, vec![Origin::Human, Origin::Ai, Origin::Human, Origin::Ai]);
        assert_eq!(state.last_message().map(ChatMessage::text), Some("two"));
    }

    #[test]
    fn origin_serialises_lowercase() {
        let json = serde_json::to_string(&ChatMessage::new(Origin::Ai, "hello")).unwrap();
        assert_eq!(json, r#"{"origin":"ai","text":"hello"}"#);
    }
}
