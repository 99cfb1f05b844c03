//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, Incoming, Transport, TransportError};

/// The request path upgrades are accepted on unless configured otherwise.
pub const DEFAULT_PATH: &str = "/ws";

/// How long a client gets to send its upgrade request.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Only upgrade requests for the configured path are accepted; anything
/// else is answered with `404 Not Found` and never becomes a connection.
pub struct WebSocketTransport {
    listener: TcpListener,
    path: Arc<str>,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address, serving
    /// [`DEFAULT_PATH`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with_path(addr, DEFAULT_PATH).await
    }

    /// Binds a new WebSocket transport that upgrades requests for `path`.
    pub async fn bind_with_path(
        addr: &str,
        path: &str,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, path, "WebSocket transport listening");
        Ok(Self {
            listener,
            path: Arc::from(path),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long an accepted client may take to finish the upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Incoming = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        Ok(PendingWebSocket {
            stream,
            peer,
            path: Arc::clone(&self.path),
            timeout: self.handshake_timeout,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A TCP connection waiting for its WebSocket upgrade.
pub struct PendingWebSocket {
    stream: TcpStream,
    peer: SocketAddr,
    path: Arc<str>,
    timeout: Duration,
}

impl Incoming for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let Self {
            stream,
            peer,
            path,
            timeout,
        } = self;

        let check_path = move |req: &Request, resp: Response| {
            if req.uri().path() == &*path {
                Ok(resp)
            } else {
                let mut rejection: ErrorResponse =
                    ErrorResponse::new(Some("not found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws = tokio::time::timeout(
            timeout,
            tokio_tungstenite::accept_hdr_async(stream, check_path),
        )
        .await
        .map_err(|_| TransportError::HandshakeFailed(format!("no upgrade within {timeout:?}")))?
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        tracing::debug!(%peer, "accepted WebSocket connection");
        Ok(WebSocketConnection::new(ws, peer))
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// A single WebSocket connection.
///
/// The stream is split into its sink and source halves, each behind its own
/// lock, so a pending `recv` never holds up a `send`.
pub struct WebSocketConnection {
    peer: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    source: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn new(ws: WsStream, peer: SocketAddr) -> Self {
        let (sink, source) = ws.split();
        Self {
            peer,
            sink: Mutex::new(sink),
            source: Mutex::new(source),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Envelopes are UTF-8 text; anything else goes out as a binary frame.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut source = self.source.lock().await;
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self.sink.lock().await.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::ConnectionClosed(e.to_string())),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
