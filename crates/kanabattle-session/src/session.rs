//! Session types: the server's record of one connection.
//!
//! A session tracks:
//! - WHO is connected (the [`Identity`] the authenticator vouched for)
//! - WHERE they are (the code of the room they currently belong to)
//! - HOW to reach them (a bounded outbound mailbox)
//!
//! The session is not a task. The connection handler owns the receiving
//! half of the mailbox and drains it into the socket; rooms hold an
//! `Arc<Session>` and push into it with [`Session::try_deliver`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kanabattle_protocol::{RoomCode, ServerMessage, UserId};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{Identity, SessionError};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// The receiving half of a session's mailbox.
pub type Mailbox = mpsc::Receiver<ServerMessage>;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How many outbound messages may queue up for one connection before
    /// the next delivery fails and the session is evicted.
    ///
    /// Default: 256.
    pub mailbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Process-unique identifier of one connection.
///
/// Two tabs of the same user get two `SessionId`s but share a `UserId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connected participant.
///
/// Created on accept, destroyed when the last `Arc` is dropped after
/// disconnect. Belongs to at most one room at a time.
pub struct Session {
    id: SessionId,
    identity: Identity,

    /// `None` once closed. Dropping the sender ends the writer's drain
    /// loop after it has flushed whatever was already queued.
    mailbox: Mutex<Option<mpsc::Sender<ServerMessage>>>,

    /// Written only by the room loop that admitted or released this session.
    current_room: Mutex<Option<RoomCode>>,
}

impl Session {
    /// Creates a session and returns it together with its mailbox.
    pub fn new(identity: Identity, config: &SessionConfig) -> (Arc<Self>, Mailbox) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity.max(1));
        let session = Arc::new(Self {
            id: SessionId::next(),
            identity,
            mailbox: Mutex::new(Some(sender)),
            current_room: Mutex::new(None),
        });
        (session, receiver)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    /// Pushes a message into the mailbox without waiting.
    ///
    /// # Errors
    /// - [`SessionError::MailboxFull`] if the mailbox is at capacity
    /// - [`SessionError::MailboxClosed`] if it was closed or the writer is gone
    pub fn try_deliver(&self, message: ServerMessage) -> Result<(), SessionError> {
        let mailbox = lock(&self.mailbox);
        let Some(sender) = mailbox.as_ref() else {
            return Err(SessionError::MailboxClosed(self.id));
        };
        sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::MailboxFull(self.id),
            TrySendError::Closed(_) => SessionError::MailboxClosed(self.id),
        })
    }

    /// Closes the mailbox. Idempotent.
    ///
    /// Returns `true` if this call did the closing.
    pub fn close_mailbox(&self) -> bool {
        let closed = lock(&self.mailbox).take().is_some();
        if closed {
            tracing::debug!(session = %self.id, "mailbox closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.mailbox)
            .as_ref()
            .is_none_or(|sender| sender.is_closed())
    }

    /// The code of the room this session currently belongs to.
    pub fn current_room(&self) -> Option<RoomCode> {
        lock(&self.current_room).clone()
    }

    pub fn set_current_room(&self, code: RoomCode) {
        *lock(&self.current_room) = Some(code);
    }

    /// Clears the current room only if it is still `code`.
    ///
    /// A late release from a room the session already left must not wipe
    /// a newer membership. Returns `true` if the field was cleared.
    pub fn clear_current_room_if(&self, code: &RoomCode) -> bool {
        let mut current = lock(&self.current_room);
        if current.as_ref() == Some(code) {
            *current = None;
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .field("current_room", &self.current_room())
            .finish_non_exhaustive()
    }
}

/// The guarded data stays consistent even if a holder panicked, so a
/// poisoned lock is simply recovered.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
