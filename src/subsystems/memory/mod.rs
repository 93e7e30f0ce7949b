//! Memory subsystem: in-process session registry.
//!
//! Sessions are keyed by a UUIDv7 string handed to the browser. Each
//! [`SessionState`] sits behind its own async mutex; a chat turn holds that
//! lock from validation to the final append, so two turns never interleave
//! on one session. Nothing is persisted: ending a session (or the process)
//! drops its history.

pub mod session;

pub use session::{ChatMessage, Origin, SessionState};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Default cap on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;
/// Default idle time after which a session is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Shared, lockable handle to one session.
pub type SharedSession = Arc<tokio::sync::Mutex<SessionState>>;

struct Entry {
    session: SharedSession,
    last_seen: Instant,
}

/// Registry of live sessions. Constructed once at startup, shared via `Arc`.
///
/// Sessions idle for longer than `idle_timeout` are dropped, and once
/// `max_sessions` are live the least recently used one makes room for a
/// new one.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_sessions` is clamped to at least one.
    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    /// Fresh time-ordered session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    /// Return the session for `session_id`, creating it with default state
    /// on first use. Calling it again never resets an existing session.
    pub fn ensure_initialized(&self, session_id: &str) -> SharedSession {
        let now = Instant::now();
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get_mut(session_id) {
            existing.last_seen = now;
            return existing.session.clone();
        }

        self.evict_idle(&mut sessions, now);
        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                sessions.remove(&id);
                info!(session_id = %id, max_sessions = self.max_sessions, "session evicted");
            }
        }

        info!(%session_id, "session created");
        let session = Arc::new(tokio::sync::Mutex::new(SessionState::new()));
        sessions.insert(session_id.to_string(), Entry { session: session.clone(), last_seen: now });
        session
    }

    /// Look up an existing session without creating it. Counts as activity.
    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        let now = Instant::now();
        let mut sessions = self.lock();
        self.evict_idle(&mut sessions, now);
        sessions.get_mut(session_id).map(|e| {
            e.last_seen = now;
            e.session.clone()
        })
    }

    /// Drop a session and its history. Returns `false` if it did not exist.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            debug!(%session_id, "session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, e| now.duration_since(e.last_seen) < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "idle sessions dropped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // The map is only ever inserted into or removed from; a panic while
        // holding the guard cannot leave it half-updated.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_initialized_is_idempotent() {
        let store = SessionStore::new();
        let id = SessionStore::new_session_id();

        let first = store.ensure_initialized(&id);
        first.lock().await.push_turn("q", "a");

        let second = store.ensure_initialized(&id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.history().len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.ensure_initialized("a");
        let b = store.ensure_initialized("b");
        a.lock().await.push_turn("q", "a");
        assert!(b.lock().await.history().is_empty());
    }

    #[test]
    fn end_session_drops_state() {
        let store = SessionStore::new();
        store.ensure_initialized("gone");
        assert!(store.end_session("gone"));
        assert!(!store.end_session("gone"));
        assert!(store.get("gone").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_store_evicts_least_recently_used() {
        let store = SessionStore::with_limits(2, DEFAULT_IDLE_TIMEOUT);
        let tick = || tokio::time::advance(Duration::from_secs(1));
        store.ensure_initialized("a");
        tick().await;
        store.ensure_initialized("b");
        tick().await;
        store.ensure_initialized("a");
        tick().await;
        store.ensure_initialized("c");
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let store = SessionStore::with_limits(10, Duration::from_secs(60));
        store.ensure_initialized("old");
        tokio::time::advance(Duration::from_secs(30)).await;
        store.ensure_initialized("recent");
        tokio::time::advance(Duration::from_secs(45)).await;

        assert!(store.get("old").is_none());
        assert!(store.get("recent").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionStore::new_session_id(), SessionStore::new_session_id());
    }
}
