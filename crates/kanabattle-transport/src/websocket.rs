//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{query_param, Connection, ConnectionId, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// How long a client gets to finish the upgrade request.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// When a credential parameter is configured, upgrade requests whose query
/// string lacks it are answered with `401 Unauthorized` and never become
/// connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    credential_param: Option<&'static str>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            credential_param: None,
        })
    }

    /// Rejects upgrades that do not carry `param` in their query string.
    pub fn require_credential(mut self, param: &'static str) -> Self {
        self.credential_param = Some(param);
        self
    }
}

impl WebSocketTransport {
    /// Accepts the next TCP connection without running the upgrade.
    ///
    /// The handshake waits on the client, so callers that serve many
    /// clients should finish it with [`PendingUpgrade::upgrade`] on a task
    /// of its own.
    pub async fn accept_stream(&mut self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        Ok(PendingUpgrade {
            stream,
            addr,
            required: self.credential_param,
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.accept_stream().await?.upgrade().await
    }

    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

/// A TCP connection whose WebSocket handshake has not run yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    required: Option<&'static str>,
}

impl PendingUpgrade {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the WebSocket handshake.
    ///
    /// Gives up after [`HANDSHAKE_TIMEOUT`] if the client stalls.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let Self {
            stream,
            addr,
            required,
        } = self;
        let mut query: Option<String> = None;
        let mut rejected = false;

        let handshake = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let q = req.uri().query().map(str::to_owned);
                if let Some(param) = required {
                    let present = q
                        .as_deref()
                        .and_then(|q| query_param(q, param))
                        .is_some();
                    if !present {
                        rejected = true;
                        let mut err =
                            ErrorResponse::new(Some("unauthorized".to_owned()));
                        *err.status_mut() = StatusCode::UNAUTHORIZED;
                        return Err(err);
                    }
                }
                query = q;
                Ok(resp)
            },
        );

        let ws = match time::timeout(HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(_)) if rejected => {
                tracing::debug!(%addr, "upgrade rejected: missing credential");
                return Err(TransportError::MissingCredential(
                    required.unwrap_or_default(),
                ));
            }
            Ok(Err(e)) => return Err(TransportError::Upgrade(e.to_string())),
            Err(_) => {
                tracing::debug!(%addr, "upgrade abandoned: handshake timed out");
                return Err(TransportError::Upgrade("handshake timed out".to_owned()));
            }
        };

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            query,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so the writer half and the reader half lock
/// independently; a pending `recv` never holds up a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    query: Option<String>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads go out as text frames (browsers read JSON that way),
    /// anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.write(msg).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::Receive(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.write(Message::Ping(Default::default())).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}
