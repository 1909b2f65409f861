//! In-process datagram network.
//!
//! A [`MemoryNetwork`] routes datagrams between [`MemoryTransport`] endpoints
//! by address, with optional loss injection. It lets the protocol loops run
//! deterministically without sockets.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::DatagramTransport;

type DropFilter = Box<dyn FnMut(SocketAddr, SocketAddr, &[u8]) -> bool + Send>;

#[derive(Default)]
struct Inner {
    queues: HashMap<SocketAddr, VecDeque<(Vec<u8>, SocketAddr)>>,
    next_port: u16,
    filter: Option<DropFilter>,
    delivered: u64,
    dropped: u64,
}

/// Shared routing table for in-memory endpoints.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryNetwork")
            .field("endpoints", &inner.queues.len())
            .field("delivered", &inner.delivered)
            .field("dropped", &inner.dropped)
            .finish()
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`.
    pub fn bind(&self, addr: SocketAddr) -> io::Result<MemoryTransport> {
        let mut inner = self.lock();
        if inner.queues.contains_key(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{addr} already bound"),
            ));
        }
        inner.queues.insert(addr, VecDeque::new());
        Ok(MemoryTransport {
            network: self.clone(),
            addr,
        })
    }

    /// Attach an endpoint at the next free loopback port.
    pub fn endpoint(&self) -> MemoryTransport {
        let mut inner = self.lock();
        loop {
            inner.next_port = inner.next_port.wrapping_add(1).max(1);
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), inner.next_port);
            if !inner.queues.contains_key(&addr) {
                inner.queues.insert(addr, VecDeque::new());
                return MemoryTransport {
                    network: self.clone(),
                    addr,
                };
            }
        }
    }

    /// Install a loss filter: datagrams for which it returns `true` are
    /// dropped. Arguments are `(from, to, datagram)`.
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: FnMut(SocketAddr, SocketAddr, &[u8]) -> bool + Send + 'static,
    {
        self.lock().filter = Some(Box::new(filter));
    }

    /// Remove any loss filter.
    pub fn clear_drop_filter(&self) {
        self.lock().filter = None;
    }

    /// Datagrams delivered into some endpoint's queue so far.
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    /// Datagrams dropped by the filter or for lack of a receiver.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, datagram: &[u8]) {
        let mut inner = self.lock();
        let lost = inner
            .filter
            .as_mut()
            .is_some_and(|filter| filter(from, to, datagram));
        if lost {
            inner.dropped += 1;
            return;
        }
        match inner.queues.get_mut(&to) {
            Some(queue) => {
                queue.push_back((datagram.to_vec(), from));
                inner.delivered += 1;
            }
            None => inner.dropped += 1,
        }
    }

    fn pop(&self, addr: SocketAddr) -> Option<(Vec<u8>, SocketAddr)> {
        self.lock().queues.get_mut(&addr)?.pop_front()
    }
}

/// One endpoint on a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    addr: SocketAddr,
}

impl MemoryTransport {
    /// Create two endpoints on a fresh network.
    pub fn pair() -> (Self, Self) {
        let network = MemoryNetwork::new();
        (network.endpoint(), network.endpoint())
    }

    /// Address this endpoint is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The network this endpoint belongs to.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Number of datagrams waiting in this endpoint's queue.
    pub fn pending(&self) -> usize {
        self.network
            .lock()
            .queues
            .get(&self.addr)
            .map_or(0, VecDeque::len)
    }

    /// Drain every waiting datagram without handing it to a protocol loop.
    pub fn drain(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.network
            .lock()
            .queues
            .get_mut(&self.addr)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

impl DatagramTransport for MemoryTransport {
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        self.network.route(self.addr, target, datagram);
        Ok(())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some((datagram, from)) = self.network.pop(self.addr) else {
            return Ok(None);
        };
        // Same truncation semantics as a UDP socket with a short buffer.
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(Some((len, from)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
