use crate::session::cleanup::{Cleanup, CleanupTask};
use crate::session::store::SessionStore;
use crate::session::types::{MessageRef, Session, SessionState};
use std::sync::Arc;
use tracing::{debug, info};

/// Coordinates the per-user conversation state.
///
/// A passive state holder: it never talks to the outside world and never
/// fails. Transitions are applied unconditionally. Whether a transition makes
/// sense for the current state is decided by the conversation handler before
/// it calls in here.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    store: Arc<SessionStore>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manager over an existing store (shared with tests or other
    /// managers).
    pub fn with_store(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Gets an existing session or creates a new Idle one.
    ///
    /// Refreshes `last_activity`. The returned value is a snapshot.
    pub fn get_or_create_session(&self, user_id: i64) -> Session {
        self.store.get(user_id)
    }

    /// Sets the session state, whatever the current state is.
    pub fn transition(&self, user_id: i64, new_state: SessionState) -> Session {
        self.store.update(user_id, |session| {
            if session.state != new_state {
                debug!(
                    user_id = %user_id,
                    from = %session.state,
                    to = %new_state,
                    "Session transition"
                );
            }
            session.state = new_state;
        })
    }

    /// Attaches (or overwrites) the reference to the bot's latest prompt.
    pub fn attach_message_ref(&self, user_id: i64, message_ref: MessageRef) {
        self.store.update(user_id, |session| {
            session.pending_message_ref = Some(message_ref);
        });
    }

    /// Drops the session. The next access starts over at Idle.
    pub fn cancel(&self, user_id: i64) {
        if self.store.delete(user_id) {
            debug!(user_id = %user_id, "Session deleted");
        }
    }

    /// Removes every session idle for longer than the timeout and returns how
    /// many were removed.
    pub fn sweep_expired(&self) -> usize {
        Cleanup::new(Arc::clone(&self.store)).run().sessions_deleted
    }

    /// Starts the repeating expiry sweep.
    ///
    /// Call once at startup and keep the handle; `stop` it on shutdown.
    pub fn start_expiry(&self) -> CleanupTask {
        info!("Starting session expiry task");
        Cleanup::new(Arc::clone(&self.store)).start_cleanup_task()
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_get_or_create_session() {
        let manager = SessionManager::new();
        let session = manager.get_or_create_session(12345);
        assert_eq!(session.user_id, 12345);
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.pending_message_ref.is_none());
    }

    #[test]
    fn test_transition_sequence() {
        let manager = SessionManager::new();
        let user_id = 12345;

        let session = manager.transition(user_id, SessionState::AwaitingImage);
        assert_eq!(session.state, SessionState::AwaitingImage);

        let session = manager.transition(user_id, SessionState::Processing);
        assert_eq!(session.state, SessionState::Processing);

        let session = manager.transition(user_id, SessionState::Idle);
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn test_transition_is_not_validated() {
        let manager = SessionManager::new();
        // Idle -> Processing skips AwaitingImage and is still applied
        let session = manager.transition(1, SessionState::Processing);
        assert_eq!(session.state, SessionState::Processing);
    }

    #[test]
    fn test_transition_keeps_message_ref() {
        let manager = SessionManager::new();
        let message_ref = MessageRef::new(1, 10);
        manager.attach_message_ref(1, message_ref);
        let session = manager.transition(1, SessionState::AwaitingImage);
        assert_eq!(session.pending_message_ref, Some(message_ref));
    }

    #[test]
    fn test_attach_message_ref_overwrites() {
        let manager = SessionManager::new();
        manager.attach_message_ref(1, MessageRef::new(1, 10));
        manager.attach_message_ref(1, MessageRef::new(1, 11));
        let session = manager.get_or_create_session(1);
        assert_eq!(session.pending_message_ref, Some(MessageRef::new(1, 11)));
    }

    #[test]
    fn test_returned_session_is_a_snapshot() {
        let manager = SessionManager::new();
        let mut session = manager.get_or_create_session(1);
        session.state = SessionState::Processing;
        assert_eq!(session.state, SessionState::Processing);
        assert_eq!(manager.get_or_create_session(1).state, SessionState::Idle);
    }

    #[test]
    fn test_cancel_resets() {
        let manager = SessionManager::new();
        manager.transition(1, SessionState::AwaitingImage);
        manager.attach_message_ref(1, MessageRef::new(1, 3));

        manager.cancel(1);
        assert_eq!(manager.session_count(), 0);

        let session = manager.get_or_create_session(1);
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.pending_message_ref.is_none());
    }

    #[test]
    fn test_cancel_unknown_user_is_noop() {
        let manager = SessionManager::new();
        manager.cancel(404);
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_sweep_expired() {
        let manager = SessionManager::new();
        let mut stale = Session::new(1);
        stale.last_activity = Utc::now() - Duration::minutes(20);
        manager.store().set(1, stale);
        manager.get_or_create_session(2);

        assert_eq!(manager.sweep_expired(), 1);
        assert_eq!(manager.session_count(), 1);
        assert!(manager.store().peek(2).is_some());
    }
}
