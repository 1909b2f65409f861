//! Async UDP socket wrapper for QUAY transport.
//!
//! [`QuaySocket`] is the production [`DatagramTransport`]: the protocol loops
//! poll it without blocking, and the async helpers let a task park until a
//! datagram is ready instead of spinning.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::core::DatagramTransport;

/// Async UDP socket wrapper for QUAY.
///
/// Cheap to clone; clones share the underlying socket.
#[derive(Debug, Clone)]
pub struct QuaySocket {
    socket: Arc<UdpSocket>,
}

impl QuaySocket {
    /// Create a new QUAY socket bound to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Create a QUAY socket from an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send a datagram, waiting for send capacity.
    pub async fn send_datagram(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Receive a datagram into `buf`, waiting until one arrives.
    pub async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Wait up to `timeout` for the socket to become readable.
    ///
    /// Returns `Ok(false)` on timeout.
    pub async fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        match tokio::time::timeout(timeout, self.socket.readable()).await {
            Ok(ready) => ready.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    /// Get a reference to the underlying socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }
}

impl DatagramTransport for QuaySocket {
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        match self.socket.try_send_to(datagram, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::trace!(%target, len = datagram.len(), "send buffer full, datagram dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
