//! Per-connection handler: auth, mailbox pump and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Validate the token from the upgrade request → identity
//!   2. Register a session with the hub
//!   3. Spawn the writer: mailbox → socket, plus keep-alive pings
//!   4. Loop: decode client frames → hub or room

use std::sync::Arc;
use std::time::Duration;

use kanabattle_protocol::{ClientMessage, Codec, ServerMessage};
use kanabattle_room::{Hub, RoomHandle, RoomMessage};
use kanabattle_session::{Authenticator, Identity, Mailbox, Session};
use kanabattle_transport::{Connection, TransportError, WebSocketConnection};
use tokio::task::JoinHandle;

use crate::BattleError;
use crate::server::{ServerState, TOKEN_PARAM};

/// How often the writer pings an otherwise quiet socket.
const PING_INTERVAL: Duration = Duration::from_secs(54);

/// Drop guard that unregisters a session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async part.
struct SessionGuard {
    session: Arc<Session>,
    hub: Hub,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let session = Arc::clone(&self.session);
        let hub = self.hub.clone();
        tokio::spawn(async move {
            hub.unregister(&session).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), BattleError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let identity = authenticate(&conn, &state).await?;

    let (session, mailbox) = Session::new(identity, &state.session_config);
    tracing::info!(
        %conn_id,
        session = %session.id(),
        user = %session.user_id(),
        "player connected"
    );
    state.hub.register(Arc::clone(&session));
    let _guard = SessionGuard {
        session: Arc::clone(&session),
        hub: state.hub.clone(),
    };

    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), mailbox, Arc::clone(&state)));

    // Cached so room traffic skips the hub's directory lock.
    let mut room: Option<RoomHandle> = None;

    let writer_done = loop {
        let data = tokio::select! {
            _ = &mut writer => {
                tracing::debug!(session = %session.id(), "mailbox closed, dropping connection");
                break true;
            }
            frame = conn.recv() => match frame {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(session = %session.id(), "connection closed cleanly");
                    break false;
                }
                Err(e) => {
                    tracing::debug!(session = %session.id(), error = %e, "recv error");
                    break false;
                }
            },
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session = %session.id(), error = %e, "dropping undecodable frame");
                continue;
            }
        };

        dispatch(&state.hub, &session, &mut room, msg).await;
    };

    // Lets the writer flush whatever is queued, then close the socket.
    session.close_mailbox();
    if !writer_done {
        let _ = writer.await;
    }

    // _guard drops here → hub.unregister fires.
    Ok(())
}

/// Validates the upgrade request's token. On failure the client gets an
/// `ERROR` frame before the socket closes.
async fn authenticate<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<Identity, BattleError>
where
    A: Authenticator,
    C: Codec,
{
    let token = conn
        .query_param(TOKEN_PARAM)
        .ok_or(TransportError::MissingCredential(TOKEN_PARAM))?;

    match state.auth.authenticate(token).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            tracing::debug!(conn_id = %conn.id(), error = %e, "rejecting connection");
            let bytes = state.codec.encode(&ServerMessage::error("unauthorized"))?;
            let _ = conn.send(&bytes).await;
            let _ = conn.close().await;
            Err(e.into())
        }
    }
}

/// Routes one decoded client message.
async fn dispatch(
    hub: &Hub,
    session: &Arc<Session>,
    room: &mut Option<RoomHandle>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::CreateRoom(config) => match hub.create_room(config, session.user_id()) {
            Ok(code) => {
                if let Ok(handle) = hub.join_room(session, code.as_str()).await {
                    *room = Some(handle);
                }
            }
            Err(e) => {
                tracing::debug!(session = %session.id(), error = %e, "create rejected");
                let _ = session.try_deliver(ServerMessage::error(e.client_message()));
            }
        },

        // Failures are reported to the session by the hub.
        ClientMessage::JoinRoom { code } => {
            if let Ok(handle) = hub.join_room(session, &code).await {
                *room = Some(handle);
            }
        }

        ClientMessage::StartGame {} => forward(hub, session, room, RoomMessage::StartGame).await,

        ClientMessage::SubmitScore { score } => {
            forward(hub, session, room, RoomMessage::SubmitScore(score)).await;
        }
    }
}

/// Sends a room-scoped request to the session's current room, if any.
async fn forward(
    hub: &Hub,
    session: &Arc<Session>,
    room: &mut Option<RoomHandle>,
    msg: RoomMessage,
) {
    let Some(code) = session.current_room() else {
        tracing::debug!(session = %session.id(), ?msg, "not in a room, ignoring");
        *room = None;
        return;
    };

    let result = match room.as_ref() {
        Some(handle) if handle.code() == &code && !handle.is_closed() => {
            handle.send_message(session.id(), msg).await
        }
        _ => {
            *room = hub.room(&code);
            hub.route_to_room(&code, session, msg).await
        }
    };
    if let Err(e) = result {
        tracing::debug!(session = %session.id(), error = %e, "room request not delivered");
    }
}

/// Drains the session's mailbox onto the socket until the mailbox closes
/// or the socket fails, then closes the socket.
async fn write_loop<A, C>(
    conn: Arc<WebSocketConnection>,
    mut mailbox: Mailbox,
    state: Arc<ServerState<A, C>>,
) where
    A: Authenticator,
    C: Codec,
{
    let start = tokio::time::Instant::now() + PING_INTERVAL;
    let mut ping = tokio::time::interval_at(start, PING_INTERVAL);

    loop {
        tokio::select! {
            msg = mailbox.recv() => {
                let Some(msg) = msg else { break };
                let bytes = match state.codec.encode(&msg) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode server message");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = conn.ping().await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    let _ = conn.close().await;
}
