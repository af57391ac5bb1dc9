//! Session registry.
//!
//! The registry is the sole strong owner of sessions: a session joins
//! on establishment and leaves on termination, and once its reader and
//! writer tasks have unwound, the last `Arc` drops and the session is
//! freed. Callers that need to outlive a session keep the registry,
//! not the session.

use super::{Session, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Concurrent map of established sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Allocate a session id.
    pub(crate) fn allocate_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an established session.
    pub fn add(&self, session: Arc<Session>) {
        let id = session.id();
        let previous = self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .insert(id, session);
        debug_assert!(previous.is_none(), "session id {id} registered twice");
        debug!(session_id = id, "session registered");
    }

    /// Remove a session. Missing ids are ignored, which makes repeated
    /// termination paths harmless.
    pub fn remove(&self, id: SessionId) {
        if self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(&id)
            .is_some()
        {
            debug!(session_id = id, "session removed");
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all registered sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
