//! Connection sessions for Kana Battle.
//!
//! This crate handles everything that belongs to one connected participant:
//!
//! 1. **Authentication**: turning a bearer credential into an [`Identity`]
//!    ([`Authenticator`] trait, [`JwtAuthenticator`]).
//! 2. **Sessions**: a per-connection [`Session`] with a bounded outbound
//!    mailbox that rooms push into without blocking.
//! 3. **Registry**: knowing who's connected ([`SessionRegistry`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← pushes ServerMessages into session mailboxes
//!     ↕
//! Session Layer (this crate)  ← identity, mailbox, current room
//!     ↕
//! Protocol Layer (below)  ← provides UserId, RoomCode, ServerMessage
//! ```

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{Authenticator, Identity, JwtAuthenticator};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{Mailbox, Session, SessionConfig, SessionId};
