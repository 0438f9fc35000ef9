//! Concurrent in-memory session map
//!
//! Every operation takes the map lock for a bounded, I/O-free critical
//! section and hands out owned copies, so callers never hold a reference
//! into the map.

use crate::session::types::Session;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the map itself intact, so a
    // poisoned lock is recovered instead of propagated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session for `user_id`, creating an Idle one if absent.
    ///
    /// Lookup, creation and the `last_activity` refresh happen under one
    /// write lock, so two concurrent first accesses still produce a single
    /// session.
    pub fn get(&self, user_id: i64) -> Session {
        let now = Utc::now();
        let mut guard = self.write();
        let session = guard
            .entry(user_id)
            .or_insert_with(|| Session::new(user_id));
        session.touch(now);
        session.clone()
    }

    /// Replaces the stored session wholesale.
    pub fn set(&self, user_id: i64, session: Session) {
        self.write().insert(user_id, session);
    }

    /// Applies `mutate` to the session for `user_id` (created if absent) and
    /// returns the stored result. The read-modify-write is atomic.
    pub fn update<F>(&self, user_id: i64, mutate: F) -> Session
    where
        F: FnOnce(&mut Session),
    {
        let now = Utc::now();
        let mut guard = self.write();
        let session = guard
            .entry(user_id)
            .or_insert_with(|| Session::new(user_id));
        mutate(session);
        session.touch(now);
        session.clone()
    }

    /// Removes the entry if present. Absent keys are a no-op.
    pub fn delete(&self, user_id: i64) -> bool {
        self.write().remove(&user_id).is_some()
    }

    /// Removes the entry only if `predicate` holds for its current value.
    ///
    /// The check and the removal share one write lock, so the value that was
    /// tested is the value that gets removed.
    pub fn remove_if<P>(&self, user_id: i64, predicate: P) -> bool
    where
        P: FnOnce(&Session) -> bool,
    {
        let mut guard = self.write();
        match guard.get(&user_id) {
            Some(session) if predicate(session) => {
                guard.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Visits a snapshot of every session.
    ///
    /// The lock is released before `visit` runs, so the visitor may call back
    /// into the store (including `delete`) without deadlocking, and entries
    /// removed meanwhile do not disturb the rest of the walk.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Session),
    {
        let snapshot: Vec<Session> = self.read().values().cloned().collect();
        for session in &snapshot {
            visit(session);
        }
    }

    /// Returns a copy of the session without refreshing its activity time.
    pub fn peek(&self, user_id: i64) -> Option<Session> {
        self.read().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{MessageRef, SessionState};
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_get_creates_idle_session() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let session = store.get(7);
        assert_eq!(session.user_id, 7);
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_refreshes_last_activity() {
        let store = SessionStore::new();
        let mut old = Session::new(7);
        old.last_activity = Utc::now() - Duration::minutes(3);
        store.set(7, old.clone());

        let session = store.get(7);
        assert!(session.last_activity > old.last_activity);
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let store = SessionStore::new();
        store.get(7);

        let mut replacement = Session::new(7);
        replacement.state = SessionState::Processing;
        replacement.pending_message_ref = Some(MessageRef::new(7, 11));
        store.set(7, replacement.clone());

        assert_eq!(store.peek(7), Some(replacement));
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let store = SessionStore::new();
        assert!(!store.delete(99));
        store.get(1);
        assert!(store.delete(1));
        assert!(store.peek(1).is_none());
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let store = SessionStore::new();
        store.get(1);
        assert!(!store.remove_if(1, |s| s.state == SessionState::Processing));
        assert!(store.remove_if(1, |s| s.state == SessionState::Idle));
        assert!(!store.remove_if(1, |_| true));
    }

    #[test]
    fn test_for_each_tolerates_deletion() {
        let store = SessionStore::new();
        for id in 0..10 {
            store.get(id);
        }

        let mut visited = Vec::new();
        store.for_each(|session| {
            // Delete a different entry on every visit
            store.delete((session.user_id + 1) % 10);
            visited.push(session.user_id);
        });

        visited.sort_unstable();
        assert_eq!(visited, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_get_creates_single_entry() {
        let store = Arc::new(SessionStore::new());
        std::thread::scope(|scope| {
            for _ in 0..16 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..100 {
                        store.get(5);
                    }
                });
            }
        });
        assert_eq!(store.len(), 1);
    }
}
