//! Unified error type for the Kana Battle server.

use kanabattle_protocol::ProtocolError;
use kanabattle_room::RoomError;
use kanabattle_session::SessionError;
use kanabattle_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates `From` impls, so the
/// `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or mailbox failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, in progress, bad config).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The process environment is missing or has a bad setting.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
