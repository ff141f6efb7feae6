//! Errors raised while accepting or talking to a client connection.

use std::io;

/// Errors that can occur in the transport layer.
///
/// Socket-level failures keep the underlying cause as their source.
/// Protocol-library errors are folded into `io::Error` so this type does
/// not depend on which transport feature is enabled.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be opened.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    /// The OS refused to hand over the next TCP connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The peer connected but the WebSocket upgrade did not complete.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// The upgrade request did not carry the required credential.
    #[error("missing credential parameter `{0}`")]
    MissingCredential(&'static str),

    /// Writing a frame failed; the peer is most likely gone.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}

impl TransportError {
    /// `true` for errors caused by one misbehaving peer rather than by the
    /// listener itself. The accept loop logs those quietly and carries on.
    pub fn is_peer_error(&self) -> bool {
        matches!(self, Self::Upgrade(_) | Self::MissingCredential(_))
    }
}
