//! The session registry: every connection the server currently knows about.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. It uses a plain
//! `HashMap`; the hub that owns it wraps it in a lock and only holds that
//! lock for a single map operation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Session, SessionId};

/// All live sessions, keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. Idempotent.
    ///
    /// Returns `true` if the session was not registered before.
    pub fn insert(&mut self, session: Arc<Session>) -> bool {
        let id = session.id();
        let added = self.sessions.insert(id, session).is_none();
        if added {
            tracing::info!(session = %id, "session registered");
        }
        added
    }

    /// Removes a session, returning it if it was registered.
    pub fn remove(&mut self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            tracing::info!(session = %id, "session unregistered");
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<&Arc<Session>> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Sessions that are not currently in any room.
    pub fn lobby(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions
            .values()
            .filter(|s| s.current_room().is_none())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
