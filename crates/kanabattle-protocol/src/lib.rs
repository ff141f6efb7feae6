//! Wire protocol for Kana Battle.
//!
//! This crate defines the "language" that browser clients and the server
//! speak:
//!
//! - **Types** ([`UserId`], [`RoomCode`], [`MatchState`]): identities and the
//!   match state machine.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the `type`-tagged
//!   JSON objects that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the session
//! engine. It doesn't know about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Hub / Room
//! Room → Protocol (ServerMessage) → mailbox → Transport (bytes)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, MatchConfig, Player, Roster, ServerMessage};
pub use types::{MatchState, RoomCode, UserId};
