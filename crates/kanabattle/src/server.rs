//! `BattleServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;

use kanabattle_protocol::{Codec, JsonCodec};
use kanabattle_room::{Hub, RoomSettings};
use kanabattle_session::{Authenticator, SessionConfig};
use kanabattle_transport::{PendingUpgrade, Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{BattleError, ServerConfig};

/// Query parameter that carries the access token on the upgrade request.
pub const TOKEN_PARAM: &str = "token";

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) hub: Hub,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) session_config: SessionConfig,
}

/// Builder for configuring and starting a Kana Battle server.
///
/// # Example
///
/// ```rust,ignore
/// use kanabattle::prelude::*;
///
/// let server = BattleServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(JwtAuthenticator::new(b"secret"))
///     .await?;
/// server.run().await
/// ```
pub struct BattleServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    room_settings: RoomSettings,
}

impl BattleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            room_settings: RoomSettings::default(),
        }
    }

    /// Takes address, session and room settings from `config`.
    pub fn config(self, config: &ServerConfig) -> Self {
        self.bind(&config.bind_addr)
            .session_config(config.session.clone())
            .room_settings(config.rooms.clone())
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets grace window, timeouts and match bounds for every room.
    pub fn room_settings(mut self, settings: RoomSettings) -> Self {
        self.room_settings = settings;
        self
    }

    /// Binds the listener and assembles the server.
    ///
    /// Upgrades without a `token` query parameter are refused with 401.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<BattleServer<A, JsonCodec>, BattleError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .require_credential(TOKEN_PARAM);

        let state = Arc::new(ServerState {
            hub: Hub::new(self.room_settings),
            auth,
            codec: JsonCodec,
            session_config: self.session_config,
        });

        Ok(BattleServer { transport, state })
    }
}

impl Default for BattleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Kana Battle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BattleServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> BattleServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The hub shared by every connection. Lets an outer layer (an HTTP
    /// API, an admin task) create rooms or look at them.
    pub fn hub(&self) -> Hub {
        self.state.hub.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BattleError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Open connections keep being served by their own tasks; only new
    /// connections stop being accepted.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), BattleError> {
        tracing::info!(addr = ?self.local_addr().ok(), "kana battle server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting");
                    return Ok(());
                }
                accepted = self.transport.accept_stream() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(serve(pending, state));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }
    }
}

/// Finishes the upgrade off the accept loop, then hands the connection to
/// the handler.
async fn serve<A, C>(pending: PendingUpgrade, state: Arc<ServerState<A, C>>)
where
    A: Authenticator,
    C: Codec,
{
    let peer = pending.peer_addr();
    let conn = match pending.upgrade().await {
        Ok(conn) => conn,
        Err(e) if e.is_peer_error() => {
            tracing::debug!(%peer, error = %e, "connection refused during upgrade");
            return;
        }
        Err(e) => {
            tracing::warn!(%peer, error = %e, "upgrade failed");
            return;
        }
    };
    if let Err(e) = handle_connection(conn, state).await {
        tracing::debug!(error = %e, "connection ended with error");
    }
}
