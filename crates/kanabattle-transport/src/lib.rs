//! Transport abstraction layer for Kana Battle.
//!
//! Provides the [`Transport`] and [`Connection`] traits that turn an accepted
//! network connection into a duplex byte-message endpoint. The session
//! engine never sees sockets: it reads one message at a time from a
//! [`Connection`] and pushes bytes back through [`Connection::send`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    HANDSHAKE_TIMEOUT, PendingUpgrade, WebSocketConnection, WebSocketTransport,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier of an accepted connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next id. Ids are never reused within a process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// A single connection that can send and receive byte messages.
///
/// Implementations must allow `send` and `recv` to run concurrently from
/// different tasks: the connection handler reads on one task while the
/// mailbox writer pushes on another.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a keep-alive probe. Transports without one may no-op.
    async fn ping(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the query string of the request that opened the connection,
    /// without the leading `?`.
    fn query(&self) -> Option<&str>;

    /// Looks up a single query parameter of the opening request.
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query().and_then(|q| query_param(q, key))
    }
}

/// Finds `key` in a `a=1&b=2` style query string.
///
/// Values are returned verbatim. Credentials passed this way (JWTs) only use
/// URL-safe characters, so no percent-decoding is applied.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}
