//! Receive-side connection records.
//!
//! A connection is named by its [`ConnectionId`], never by its address: a
//! datagram from a new source address is accepted and the address updated,
//! which is how peers roam.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::crypto::SessionKey;
use crate::transport::ConnectionId;

use super::reassembly::StreamDeliveryState;

/// Per-peer state held by the receiver.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    key: SessionKey,
    peer_addr: SocketAddr,
    streams: HashMap<u64, StreamDeliveryState>,
    created_at: Instant,
    last_seen: Instant,
    migrations: u32,
}

impl Connection {
    /// New connection first heard from `peer_addr`.
    pub fn new(id: ConnectionId, key: SessionKey, peer_addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            key,
            peer_addr,
            streams: HashMap::new(),
            created_at: now,
            last_seen: now,
            migrations: 0,
        }
    }

    /// Connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Session key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Most recently observed source address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// When the connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the last authenticated datagram arrived.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Number of source address changes observed.
    pub fn migrations(&self) -> u32 {
        self.migrations
    }

    /// Record an authenticated datagram from `addr` at `now`.
    ///
    /// Returns `true` if the address changed.
    pub fn observe(&mut self, addr: SocketAddr, now: Instant) -> bool {
        self.last_seen = now;
        if addr == self.peer_addr {
            return false;
        }
        tracing::info!(
            connection_id = %self.id,
            from = %self.peer_addr,
            to = %addr,
            "peer address changed"
        );
        self.peer_addr = addr;
        self.migrations += 1;
        true
    }

    /// Replace the session key after a fresh INIT for this ID.
    ///
    /// Stream delivery cursors are kept, so bytes already released are
    /// never released again.
    pub fn rekey(&mut self, key: SessionKey) {
        self.key = key;
    }

    /// Hand a STREAM frame's payload to its stream's reassembly buffer.
    pub fn receive(&mut self, stream_id: u64, offset: u64, data: Vec<u8>) -> Vec<Vec<u8>> {
        self.streams
            .entry(stream_id)
            .or_default()
            .insert(offset, data)
    }

    /// Delivery state of one stream, if it has seen any data.
    pub fn stream(&self, stream_id: u64) -> Option<&StreamDeliveryState> {
        self.streams.get(&stream_id)
    }

    /// Number of streams that have seen data.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

/// All connections known to a receiver, keyed by connection ID.
///
/// Entries live for the life of the table.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a connection.
    ///
    /// Replacing drops the old entry's stream state, so the receiver only
    /// inserts IDs it has not seen.
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.connections.insert(connection.id(), connection)
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Look up a connection mutably.
    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Remove a connection.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over all connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Address changes summed across all connections.
    pub fn total_migrations(&self) -> u64 {
        self.connections.values().map(|c| u64::from(c.migrations)).sum()
    }
}
