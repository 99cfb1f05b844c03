//! Transport layer for Agora.
//!
//! Provides the [`Transport`] and [`Connection`] traits the chat core is
//! written against, plus a WebSocket implementation.
//!
//! A [`Connection`] is used from two tasks at once (the inbound reader and
//! the outbound writer of one participant), so implementations must allow
//! `recv` and `send` to be in flight concurrently.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PATH, PendingWebSocket, WebSocketConnection,
    WebSocketTransport,
};

use std::future::Future;
use std::net::SocketAddr;

/// Accepts new incoming connections.
///
/// Accepting is split in two so one slow client cannot hold up the rest:
/// [`accept`](Transport::accept) only takes the raw connection off the
/// listener, and the returned [`Incoming`] finishes the handshake on
/// whatever task the caller hands it to.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// A connection that has been accepted but not yet upgraded.
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Incoming, Self::Error>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// An accepted connection whose handshake has not run yet.
pub trait Incoming: Send + 'static {
    /// The connection produced by a successful handshake.
    type Connection: Connection;
    /// The error type for a failed handshake.
    type Error: std::error::Error + Send + Sync;

    /// Completes the handshake.
    fn upgrade(self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// The remote peer's network address.
    fn peer_addr(&self) -> SocketAddr;
}

/// A single duplex message channel.
///
/// The futures are declared `Send` so connection handlers can be spawned
/// onto the multi-threaded runtime while staying generic over the transport.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection. Calling it more than once is harmless.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The remote peer's network address.
    fn peer_addr(&self) -> SocketAddr;
}
