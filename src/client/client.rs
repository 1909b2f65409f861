//! High-level QUAY client API.
//!
//! Provides [`QuayClient`] for connecting to a QUAY server over UDP and
//! reliably sending bytes on any number of streams.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::congestion::BbrState;
use crate::core::{
    CryptoError, HandshakeError, SystemClock, DEFAULT_RECV_BUFFER_SIZE,
    HANDSHAKE_TIMEOUT, IDLE_POLL_INTERVAL,
};
use crate::crypto::keystore::{load_peer_public, store_peer_public};
use crate::crypto::{Initiator, Session, ZeroRttInitiator};
use crate::stream::{SenderConfig, SenderEngine, SenderStats};
use crate::transport::{is_transient_io, QuaySocket, TransportError};

/// Errors that can occur in the QUAY client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Handshake failed or timed out.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Transport failure while sending.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Key derivation from a cached value failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address to connect to.
    pub server_addr: SocketAddr,

    /// Local address to bind.
    pub bind_addr: SocketAddr,

    /// How long to wait for ACCEPT.
    pub handshake_timeout: Duration,

    /// Where the server's public value is cached.
    ///
    /// When the file holds a valid value the client connects with 0-RTT.
    /// After a full handshake the ACCEPT value is written here.
    pub peer_key_cache: Option<PathBuf>,

    /// Sender engine tuning.
    pub sender: SenderConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            peer_key_cache: None,
            sender: SenderConfig::default(),
        }
    }
}

/// Builder for creating a [`QuayClient`].
#[derive(Debug, Default)]
pub struct QuayClientBuilder {
    config: ClientConfig,
}

impl QuayClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server address.
    pub fn server_addr(mut self, addr: SocketAddr) -> Self {
        self.config.server_addr = addr;
        self
    }

    /// Set the local bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Enable 0-RTT by caching the server's public value at `path`.
    pub fn peer_key_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.peer_key_cache = Some(path.into());
        self
    }

    /// Set the STREAM frame payload size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.sender.chunk_size = size;
        self
    }

    /// Set the retransmission timeout.
    pub fn retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.config.sender.retransmit_timeout = timeout;
        self
    }

    /// Replace the whole sender configuration.
    pub fn sender_config(mut self, sender: SenderConfig) -> Self {
        self.config.sender = sender;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }

    /// Build the configuration and connect.
    pub async fn connect(self) -> Result<QuayClient, ClientError> {
        QuayClient::connect(self.build()).await
    }
}

/// A QUAY protocol client.
///
/// # Example
///
/// ```ignore
/// use quay_protocol::client::QuayClientBuilder;
///
/// let mut client = QuayClientBuilder::new()
///     .server_addr("127.0.0.1:9000".parse()?)
///     .peer_key_cache("server_pub.bin")
///     .connect()
///     .await?;
///
/// client.send(1, b"hello");
/// client.run_until_idle().await?;
/// ```
pub struct QuayClient {
    socket: QuaySocket,
    engine: SenderEngine<QuaySocket, SystemClock>,
    config: ClientConfig,
}

impl QuayClient {
    /// Connect to a QUAY server.
    ///
    /// Uses 0-RTT when `peer_key_cache` holds a valid value; otherwise runs
    /// the INIT/ACCEPT exchange, bounded by `handshake_timeout`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let socket = QuaySocket::bind(config.bind_addr).await?;

        let session = match cached_peer_public(&config) {
            Some(cached) => {
                let session = ZeroRttInitiator::from_cached(cached)?.establish()?;
                tracing::info!(
                    connection_id = %session.connection_id(),
                    server = %config.server_addr,
                    "connecting with 0-RTT"
                );
                session
            }
            None => {
                let session = full_handshake(&socket, &config).await?;
                if let Some(path) = &config.peer_key_cache {
                    if let Err(e) = store_peer_public(path, session.peer_public()) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to cache server public value");
                    }
                }
                session
            }
        };

        let engine = SenderEngine::new(
            socket.clone(),
            SystemClock,
            session,
            config.server_addr,
            config.sender.clone(),
        );
        Ok(Self {
            socket,
            engine,
            config,
        })
    }

    /// Queue `data` on `stream_id`. Returns the stream offset of its first byte.
    pub fn send(&mut self, stream_id: u64, data: &[u8]) -> u64 {
        self.engine.write(stream_id, data)
    }

    /// Run one sender iteration without waiting.
    pub fn poll(&mut self) -> Result<(), ClientError> {
        Ok(self.engine.poll()?)
    }

    /// Drive the sender until every queued byte has been acknowledged.
    ///
    /// Frames are retransmitted on timeout indefinitely, so this only
    /// returns once the server has acknowledged everything.
    pub async fn run_until_idle(&mut self) -> Result<(), ClientError> {
        loop {
            self.engine.poll()?;
            if self.engine.is_idle() {
                return Ok(());
            }
            self.socket.wait_readable(IDLE_POLL_INTERVAL).await?;
        }
    }

    /// Drive the sender until `shutdown` resolves.
    ///
    /// Unacknowledged frames are abandoned on shutdown.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), ClientError>
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        loop {
            self.engine.poll()?;
            tokio::select! {
                _ = &mut shutdown => {
                    self.close();
                    return Ok(());
                }
                ready = self.socket.wait_readable(IDLE_POLL_INTERVAL) => {
                    ready?;
                }
            }
        }
    }

    /// Abandon everything in flight or queued. Returns the number of
    /// frames dropped.
    pub fn close(&mut self) -> usize {
        let abandoned = self.engine.abandon();
        tracing::info!(
            connection_id = %self.engine.session().connection_id(),
            abandoned,
            "client stopped"
        );
        abandoned
    }

    /// Rebind to `bind_addr` and keep the connection alive on the new socket.
    ///
    /// The server follows the new address on the next authenticated datagram.
    pub async fn migrate(&mut self, bind_addr: SocketAddr) -> Result<SocketAddr, ClientError> {
        let socket = QuaySocket::bind(bind_addr).await?;
        let local = socket.local_addr()?;
        self.engine.migrate(socket.clone());
        self.socket = socket;
        tracing::info!(
            connection_id = %self.engine.session().connection_id(),
            %local,
            "client rebound"
        );
        Ok(local)
    }

    /// Session keys and identity.
    pub fn session(&self) -> &Session {
        self.engine.session()
    }

    /// Whether the connection was established with 0-RTT.
    pub fn is_zero_rtt(&self) -> bool {
        self.engine.session().is_zero_rtt()
    }

    /// Whether the server has acknowledged anything yet.
    pub fn is_confirmed(&self) -> bool {
        self.engine.is_confirmed()
    }

    /// Whether nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.engine.is_idle()
    }

    /// Sender counters.
    pub fn stats(&self) -> SenderStats {
        self.engine.stats()
    }

    /// Current congestion controller state.
    pub fn congestion_state(&self) -> BbrState {
        self.engine.congestion_state()
    }

    /// Local socket address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Server address.
    pub fn server_addr(&self) -> SocketAddr {
        self.config.server_addr
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for QuayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuayClient")
            .field("server_addr", &self.config.server_addr)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn cached_peer_public(config: &ClientConfig) -> Option<[u8; crate::core::DH_PUBLIC_SIZE]> {
    let path = config.peer_key_cache.as_ref()?;
    match load_peer_public(path) {
        Ok(cached) => cached,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unusable key cache");
            None
        }
    }
}

async fn full_handshake(
    socket: &QuaySocket,
    config: &ClientConfig,
) -> Result<Session, HandshakeError> {
    let initiator = Initiator::new();
    socket
        .send_datagram(&initiator.init_packet(), config.server_addr)
        .await?;
    tracing::debug!(
        connection_id = %initiator.connection_id(),
        server = %config.server_addr,
        "INIT sent"
    );

    let deadline = tokio::time::Instant::now() + config.handshake_timeout;
    let mut buf = vec![0u8; DEFAULT_RECV_BUFFER_SIZE];
    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_datagram(&mut buf)).await;
        let (len, from) = match received {
            Err(_) => return Err(HandshakeError::Timeout(config.handshake_timeout)),
            Ok(Err(e)) if is_transient_io(&e) => continue,
            Ok(Err(e)) => return Err(HandshakeError::Io(e)),
            Ok(Ok(got)) => got,
        };
        match initiator.complete(&buf[..len]) {
            Ok(session) => {
                tracing::info!(
                    connection_id = %session.connection_id(),
                    server = %from,
                    "handshake complete"
                );
                return Ok(session);
            }
            Err(e) => tracing::debug!(%from, error = %e, "ignoring packet while waiting for ACCEPT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let server: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        let config = QuayClientBuilder::new()
            .server_addr(server)
            .handshake_timeout(Duration::from_millis(300))
            .peer_key_cache("/tmp/quay-peer.bin")
            .chunk_size(512)
            .retransmit_timeout(Duration::from_secs(1))
            .build();

        assert_eq!(config.server_addr, server);
        assert_eq!(config.handshake_timeout, Duration::from_millis(300));
        assert_eq!(config.peer_key_cache, Some(PathBuf::from("/tmp/quay-peer.bin")));
        assert_eq!(config.sender.chunk_size, 512);
        assert_eq!(config.sender.retransmit_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.bind_addr.port(), 0);
        assert_eq!(config.handshake_timeout, HANDSHAKE_TIMEOUT);
        assert!(config.peer_key_cache.is_none());
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_full_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peer.bin");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let config = QuayClientBuilder::new().peer_key_cache(&path).build();
        assert!(cached_peer_public(&config).is_none());
    }

    #[tokio::test]
    async fn test_handshake_times_out_without_server() {
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = QuayClientBuilder::new()
            .server_addr(silent.local_addr().unwrap())
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .handshake_timeout(Duration::from_millis(100))
            .build();

        let err = QuayClient::connect(config).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Handshake(HandshakeError::Timeout(t)) if t == Duration::from_millis(100)
        ));
    }

    #[tokio::test]
    async fn test_init_send_failure_is_handshake_io() {
        // An IPv4 socket cannot reach an IPv6 server.
        let config = QuayClientBuilder::new()
            .server_addr("[::1]:9000".parse().unwrap())
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .handshake_timeout(Duration::from_millis(100))
            .build();

        let err = QuayClient::connect(config).await.unwrap_err();
        assert!(matches!(err, ClientError::Handshake(HandshakeError::Io(_))));
    }
}
