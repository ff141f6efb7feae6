//! Error types for the session layer.

use crate::SessionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Authentication failed: the credential was invalid, expired, or
    /// rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The session's mailbox is at capacity. The client is not draining
    /// its socket fast enough.
    #[error("mailbox full for session {0}")]
    MailboxFull(SessionId),

    /// The session's mailbox was already closed (disconnect or eviction).
    #[error("mailbox closed for session {0}")]
    MailboxClosed(SessionId),
}
