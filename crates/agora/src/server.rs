//! `AgoraServer` builder and accept loop.
//!
//! This ties the layers together: transport → protocol → room. The server
//! owns the listening transport and one registry; every accepted connection
//! gets its own handler task sharing a [`ServerState`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agora_protocol::{Codec, JsonCodec};
use agora_room::{RegistryHandle, RoomConfig, Sequence, spawn_registry};
use agora_transport::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PATH, Incoming, Transport, WebSocketTransport,
};

use crate::AgoraError;
use crate::handler::handle_connection;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Everything that can be tuned about a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// The only request path upgraded to a WebSocket.
    pub path: String,

    /// How long a new client gets to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,

    /// How long a connection may stay silent before it is dropped.
    pub read_timeout: Duration,

    /// Pushes buffered per participant before new ones are dropped.
    /// Zero is treated as one.
    pub outbound_queue: usize,

    /// Registry and room settings.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            path: DEFAULT_PATH.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_timeout: Duration::from_secs(600),
            outbound_queue: 256,
            room: RoomConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RegistryHandle,
    pub(crate) codec: C,
    pub(crate) participant_ids: Sequence,
    pub(crate) read_timeout: Duration,
    pub(crate) outbound_queue: usize,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting an Agora server.
///
/// ```rust,no_run
/// use agora::prelude::*;
///
/// # async fn run() -> Result<(), AgoraError> {
/// let server = AgoraServer::builder()
///     .bind("0.0.0.0:8000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AgoraServerBuilder {
    config: ServerConfig,
}

impl AgoraServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the WebSocket upgrade path.
    pub fn path(mut self, path: &str) -> Self {
        self.config.path = path.to_string();
        self
    }

    /// Sets how long a new client gets to complete the upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets the per-read inactivity timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the per-participant outbound queue size.
    pub fn outbound_queue(mut self, size: usize) -> Self {
        self.config.outbound_queue = size;
        self
    }

    /// Sets registry and room settings.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    /// Binds the listener and starts the registry, using [`JsonCodec`].
    pub async fn build(self) -> Result<AgoraServer<JsonCodec>, AgoraError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Like [`build`](Self::build), with a custom body codec.
    pub async fn build_with_codec<C: Codec>(
        self,
        codec: C,
    ) -> Result<AgoraServer<C>, AgoraError> {
        let ServerConfig {
            bind_addr,
            path,
            handshake_timeout,
            read_timeout,
            outbound_queue,
            room,
        } = self.config;

        let transport = WebSocketTransport::bind_with_path(&bind_addr, &path)
            .await?
            .with_handshake_timeout(handshake_timeout);

        let state = Arc::new(ServerState {
            registry: spawn_registry(room),
            codec,
            participant_ids: Sequence::new(),
            read_timeout,
            outbound_queue: outbound_queue.max(1),
        });

        Ok(AgoraServer { transport, state })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Agora server.
///
/// Call [`run`](Self::run) or [`run_until`](Self::run_until) to start
/// accepting connections.
pub struct AgoraServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl AgoraServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> AgoraServerBuilder {
        AgoraServerBuilder::new()
    }
}

impl<C: Codec> AgoraServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, AgoraError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle to this server's registry, e.g. for the admin console.
    pub fn registry(&self) -> RegistryHandle {
        self.state.registry.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), AgoraError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), AgoraError> {
        tokio::pin!(shutdown);
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Agora server running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Agora server shutting down");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let peer = incoming.peer_addr();
                            let conn = match incoming.upgrade().await {
                                Ok(conn) => conn,
                                Err(e) => {
                                    tracing::debug!(%peer, error = %e, "upgrade failed");
                                    return;
                                }
                            };
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.path, "/ws");
        assert_eq!(config.read_timeout, Duration::from_secs(600));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.outbound_queue, 256);
        assert_eq!(config.room.max_capacity, 16);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = AgoraServerBuilder::new()
            .bind("0.0.0.0:9000")
            .path("/chat")
            .read_timeout(Duration::from_secs(5))
            .handshake_timeout(Duration::from_secs(2));
        assert_eq!(builder.config.bind_addr, "0.0.0.0:9000");
        assert_eq!(builder.config.path, "/chat");
        assert_eq!(builder.config.read_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.handshake_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_outbound_queue_is_raised_to_one() {
        for builder in [
            AgoraServer::builder().outbound_queue(0),
            AgoraServer::builder().config(ServerConfig {
                outbound_queue: 0,
                ..ServerConfig::default()
            }),
        ] {
            let server = builder.bind("127.0.0.1:0").build().await.unwrap();
            assert_eq!(server.state.outbound_queue, 1);
        }
    }

    #[tokio::test]
    async fn test_build_binds_ephemeral_port() {
        let server = AgoraServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_run_until_returns_on_shutdown() {
        let server = AgoraServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        let result = server.run_until(async {}).await;
        assert!(result.is_ok());
    }
}
