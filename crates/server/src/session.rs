//! Session registry
//!
//! Sessions exist from socket accept to socket close. Ids are
//! monotonically increasing integers; the registry only tracks identity
//! and counts, all streaming state lives with the connection task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::ServerError;

/// One active audio session.
pub struct Session {
    pub id: u64,
    pub created_at: Instant,
}

/// Registry of active sessions.
pub struct SessionManager {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session, or fail when at capacity.
    pub fn register(&self) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(ServerError::SessionLimit(sessions.len()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            id,
            created_at: Instant::now(),
        });
        sessions.insert(id, session.clone());
        tracing::info!(session_id = id, "session opened");
        Ok(session)
    }

    /// Remove a session at socket close.
    pub fn remove(&self, id: u64) {
        if self.sessions.write().remove(&id).is_some() {
            tracing::info!(session_id = id, "session closed");
        }
    }

    /// Active session count.
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let manager = SessionManager::new(10);
        let a = manager.register().unwrap();
        let b = manager.register().unwrap();
        let c = manager.register().unwrap();

        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(manager.count(), 3);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let manager = SessionManager::new(2);
        let _a = manager.register().unwrap();
        let b = manager.register().unwrap();

        assert!(manager.register().is_err());

        // Freeing a slot admits a new session.
        manager.remove(b.id);
        assert!(manager.register().is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let manager = SessionManager::new(2);
        let a = manager.register().unwrap();
        manager.remove(a.id);
        manager.remove(a.id);
        assert_eq!(manager.count(), 0);
    }
}
