//! The hub: process-wide directory of sessions and rooms.
//!
//! The hub is discovery and bookkeeping only. It never reads or writes a
//! room's internal state; it looks rooms up, hands sessions to them and
//! forgets them when they exit.
//!
//! # Locking
//!
//! Both maps sit behind `std::sync::RwLock`s that are held for a single map
//! operation and never across an `.await`. Room handles are cloned out of
//! the lock before any command is sent.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use kanabattle_protocol::{MatchConfig, RoomCode, ServerMessage, UserId};
use kanabattle_session::{Session, SessionId, SessionRegistry};

use crate::room::{RoomSnapshot, build_room};
use crate::{RoomDirectory, RoomError, RoomHandle, RoomMessage, RoomSettings};

/// Shared entry point for everything above the room layer.
///
/// Cheap to clone; all clones share the same directory.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    rooms: RwLock<RoomDirectory>,
    sessions: RwLock<SessionRegistry>,
    settings: RoomSettings,
}

impl HubInner {
    fn rooms(&self) -> RwLockReadGuard<'_, RoomDirectory> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms_mut(&self) -> RwLockWriteGuard<'_, RoomDirectory> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> RwLockReadGuard<'_, SessionRegistry> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_mut(&self) -> RwLockWriteGuard<'_, SessionRegistry> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes a room's entry. Called by the room itself as it exits.
    fn dispose_room(&self, code: &RoomCode, instance: u64) {
        if self.rooms_mut().remove_instance(code, instance) {
            tracing::info!(room = %code, "room removed from directory");
        }
    }
}

impl Hub {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: RwLock::new(RoomDirectory::new()),
                sessions: RwLock::new(SessionRegistry::new()),
                settings,
            }),
        }
    }

    // -- Sessions ---------------------------------------------------------

    /// Makes a session visible to the hub. Idempotent.
    pub fn register(&self, session: Arc<Session>) {
        self.inner.sessions_mut().insert(session);
    }

    /// Forgets a session, closes its mailbox and tells its room it left.
    ///
    /// Safe to call more than once.
    pub async fn unregister(&self, session: &Arc<Session>) {
        self.inner.sessions_mut().remove(session.id());
        session.close_mailbox();

        if let Some(code) = session.current_room() {
            let handle = self.room(&code);
            if let Some(handle) = handle {
                // A room that already exited has released the session anyway.
                let _ = handle.leave(session.id()).await;
            }
        }
    }

    /// Sends `message` to every registered session that is not in a room.
    ///
    /// Sessions whose mailbox is full or closed are closed and unregistered.
    /// Returns how many sessions got the message.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        let mut dropped: Vec<Arc<Session>> = Vec::new();
        for session in self.inner.sessions().lobby() {
            match session.try_deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(session = %session.id(), error = %e, "dropping lobby session");
                    dropped.push(Arc::clone(session));
                }
            }
        }
        if !dropped.is_empty() {
            let mut sessions = self.inner.sessions_mut();
            for session in dropped {
                session.close_mailbox();
                sessions.remove(session.id());
            }
        }
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn is_registered(&self, session_id: SessionId) -> bool {
        self.inner.sessions().contains(session_id)
    }

    // -- Rooms ------------------------------------------------------------

    /// Creates a room in WAITING hosted by `host_id` and starts its loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidConfig`] if `config` is out of bounds.
    pub fn create_room(&self, config: MatchConfig, host_id: UserId) -> Result<RoomCode, RoomError> {
        self.inner.settings.validate(&config)?;

        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        let on_exit = Box::new(move |code: &RoomCode, instance: u64| {
            if let Some(inner) = weak.upgrade() {
                inner.dispose_room(code, instance);
            }
        });

        let (code, pending) = {
            let mut rooms = self.inner.rooms_mut();
            let code = rooms.unused_code();
            let (handle, pending) =
                build_room(code.clone(), host_id, config, &self.inner.settings, on_exit);
            rooms.insert(handle);
            (code, pending)
        };
        pending.spawn();

        tracing::info!(room = %code, host = %host_id, "room created");
        Ok(code)
    }

    /// Adds `session` to the room with code `code`.
    ///
    /// The code is normalized first. If the session is in another room it
    /// leaves that room before joining. Failures are also reported to the
    /// session as an `ERROR` message.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] if no room has this code
    /// - [`RoomError::InProgress`] if its match already started
    pub async fn join_room(
        &self,
        session: &Arc<Session>,
        code: &str,
    ) -> Result<RoomHandle, RoomError> {
        let code = RoomCode::new(code);
        let result = self.try_join(session, code).await;
        if let Err(e) = &result {
            tracing::debug!(session = %session.id(), error = %e, "join rejected");
            let _ = session.try_deliver(ServerMessage::error(e.client_message()));
        }
        result
    }

    async fn try_join(
        &self,
        session: &Arc<Session>,
        code: RoomCode,
    ) -> Result<RoomHandle, RoomError> {
        let handle = self
            .room(&code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        // Fast path only. The room makes the final call in its own loop.
        if !handle.state().is_joinable() {
            return Err(RoomError::InProgress(code));
        }

        if let Some(previous) = session.current_room().filter(|c| *c != code) {
            if let Some(old) = self.room(&previous) {
                let _ = old.leave(session.id()).await;
            }
        }

        handle.join(Arc::clone(session)).await?;
        Ok(handle)
    }

    /// Forwards a room-scoped request to the session's room `code`.
    ///
    /// An unknown code is reported to the session as an `ERROR` message.
    /// Membership and state checks happen inside the room.
    pub async fn route_to_room(
        &self,
        code: &RoomCode,
        session: &Arc<Session>,
        message: RoomMessage,
    ) -> Result<(), RoomError> {
        let result = match self.room(code) {
            Some(handle) => handle.send_message(session.id(), message).await,
            None => Err(RoomError::NotFound(code.clone())),
        };
        if let Err(e) = &result {
            let _ = session.try_deliver(ServerMessage::error(e.client_message()));
        }
        result
    }

    /// Looks up a live room. Never waits on the room itself.
    pub fn room(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.inner.rooms().get(code).cloned()
    }

    /// A copy of a room's state, or `None` if no room has this code.
    pub async fn room_snapshot(&self, code: &RoomCode) -> Option<RoomSnapshot> {
        let handle = self.room(code)?;
        Some(handle.snapshot().await)
    }

    /// Shuts a room down. Its directory entry goes away as its loop exits.
    pub async fn stop_room(&self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .room(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        handle.stop().await
    }

    pub fn room_codes(&self) -> Vec<RoomCode> {
        self.inner.rooms().codes()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_of_stalled_room_times_out_to_default() {
        let hub = Hub::new(RoomSettings::default());
        let code = RoomCode::new("ABC123");

        // Published but not running yet, so nothing answers the request.
        let pending = {
            let (handle, pending) = build_room(
                code.clone(),
                UserId::new_random(),
                MatchConfig::new(60, ["hiragana"]),
                &hub.inner.settings,
                Box::new(|_, _| {}),
            );
            hub.inner.rooms_mut().insert(handle);
            pending
        };

        let started = tokio::time::Instant::now();
        let snapshot = hub.room_snapshot(&code).await;
        assert_eq!(snapshot, Some(RoomSnapshot::default()));
        assert!(started.elapsed() >= Duration::from_millis(100));

        assert!(hub.room(&code).is_some(), "a slow room stays registered");
        assert!(!hub.room(&code).unwrap().is_closed());

        // Once the loop runs it answers normally.
        pending.spawn();
        let snapshot = hub.room_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.code, code);
        assert_eq!(snapshot.state, kanabattle_protocol::MatchState::Waiting);
    }
}
