//! In-memory session map keyed by user id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use super::ConversationState;

#[derive(Debug)]
struct Session {
    state: ConversationState,
    touched: Instant,
}

/// Per-user conversation state with expiry.
///
/// A session untouched for longer than the TTL reads as
/// [`ConversationState::Idle`].
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: i64) -> ConversationState {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&user_id) {
            Some(session) if session.touched.elapsed() <= self.ttl => session.state.clone(),
            Some(_) => {
                debug!("Session for {} expired", user_id);
                sessions.remove(&user_id);
                ConversationState::Idle
            }
            None => ConversationState::Idle,
        }
    }

    /// Moves the user to `state`; `Idle` drops the session.
    pub async fn set(&self, user_id: i64, state: ConversationState) {
        let mut sessions = self.sessions.lock().await;
        if state.is_idle() {
            sessions.remove(&user_id);
        } else {
            sessions.insert(
                user_id,
                Session {
                    state,
                    touched: Instant::now(),
                },
            );
        }
    }

    /// Returns `true` if a live session was dropped.
    pub async fn clear(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(&user_id)
            .is_some_and(|session| session.touched.elapsed() <= self.ttl)
    }

    /// Drops every expired session.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.touched.elapsed() <= self.ttl);
        before - sessions.len()
    }
}
