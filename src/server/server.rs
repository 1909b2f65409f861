//! High-level QUAY server API.
//!
//! Provides [`QuayServer`], which answers handshakes, acknowledges every
//! STREAM frame and hands in-order stream bytes to the application over a
//! channel.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::{QuayError, SystemClock, DEFAULT_RECV_BUFFER_SIZE, DH_PUBLIC_SIZE};
use crate::crypto::keystore::load_or_generate_static_key;
use crate::crypto::Responder;
use crate::stream::{ConnectionTable, Delivery, Receiver, ReceiverStats};
use crate::transport::{QuaySocket, TransportError};

/// Longest the run loop parks waiting for a datagram before re-checking
/// the shutdown signal.
const READ_WAIT: Duration = Duration::from_millis(50);

/// Errors that can occur in the QUAY server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Static key could not be loaded or created.
    #[error("key store error: {0}")]
    KeyStore(#[from] QuayError),

    /// Socket failure in the receive loop.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Where the long-term private key lives. Generated on first run.
    ///
    /// Without a path every start uses a fresh key, which invalidates
    /// clients' 0-RTT caches.
    pub static_key_path: Option<PathBuf>,

    /// Receive buffer size; longer datagrams are truncated.
    pub recv_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9000)),
            static_key_path: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Builder for creating a [`QuayServer`].
#[derive(Debug, Default)]
pub struct QuayServerBuilder {
    config: ServerConfig,
}

impl QuayServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Persist the long-term key at `path`.
    pub fn static_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.static_key_path = Some(path.into());
        self
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }

    /// Build the configuration and bind.
    pub async fn bind(self) -> Result<QuayServer, ServerError> {
        QuayServer::bind(self.build()).await
    }
}

/// A QUAY protocol server.
///
/// # Example
///
/// ```ignore
/// use quay_protocol::server::QuayServerBuilder;
///
/// let mut server = QuayServerBuilder::new()
///     .bind_addr("0.0.0.0:9000".parse()?)
///     .static_key_path("server_key.bin")
///     .bind()
///     .await?;
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel(64);
/// tokio::spawn(async move {
///     while let Some(delivery) = rx.recv().await {
///         println!("stream {}: {} bytes", delivery.stream_id, delivery.data.len());
///     }
/// });
/// server.run(tx, tokio::signal::ctrl_c()).await?;
/// ```
pub struct QuayServer {
    socket: QuaySocket,
    receiver: Receiver<QuaySocket, SystemClock>,
    config: ServerConfig,
}

impl QuayServer {
    /// Load or create the long-term key and bind the socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let responder = match &config.static_key_path {
            Some(path) => Responder::new(load_or_generate_static_key(path)?),
            None => Responder::generate(),
        };
        let socket = QuaySocket::bind(config.bind_addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "server listening");

        let receiver = Receiver::with_buffer_size(
            socket.clone(),
            SystemClock,
            responder,
            config.recv_buffer_size,
        );
        Ok(Self {
            socket,
            receiver,
            config,
        })
    }

    /// Process every waiting datagram without blocking.
    pub fn poll(&mut self) -> Result<Vec<Delivery>, ServerError> {
        Ok(self.receiver.poll()?)
    }

    /// Serve until `shutdown` resolves or `deliveries` is closed.
    ///
    /// Stream bytes are sent on `deliveries` in order per stream.
    pub async fn run<F>(
        &mut self,
        deliveries: mpsc::Sender<Delivery>,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        loop {
            for delivery in self.receiver.poll()? {
                if deliveries.send(delivery).await.is_err() {
                    tracing::info!("delivery channel closed, server stopping");
                    return Ok(());
                }
            }
            tokio::select! {
                _ = &mut shutdown => {
                    let stats = self.receiver.stats();
                    tracing::info!(
                        connections = self.receiver.connections().len(),
                        datagrams = stats.datagrams_received,
                        bytes_delivered = stats.bytes_delivered,
                        "server stopped"
                    );
                    return Ok(());
                }
                ready = self.socket.wait_readable(READ_WAIT) => {
                    ready?;
                }
            }
        }
    }

    /// Local socket address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The long-term public value clients cache for 0-RTT.
    pub fn public_value(&self) -> &[u8; DH_PUBLIC_SIZE] {
        self.receiver.responder().public_value()
    }

    /// Known connections.
    pub fn connections(&self) -> &ConnectionTable {
        self.receiver.connections()
    }

    /// Receiver counters.
    pub fn stats(&self) -> ReceiverStats {
        self.receiver.stats()
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for QuayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuayServer")
            .field("bind_addr", &self.config.bind_addr)
            .field("receiver", &self.receiver)
            .finish_non_exhaustive()
    }
}
