//! Receiver / multiplexer.
//!
//! Demultiplexes datagrams by connection ID, answers INIT, keys 0RTT
//! connections on first sight, decrypts, acknowledges every STREAM frame and
//! releases stream bytes in order.

use std::net::SocketAddr;

use crate::core::{Clock, DatagramTransport, DEFAULT_RECV_BUFFER_SIZE};
use crate::crypto::{open, seal, Responder, SessionKey};
use crate::transport::{
    decode_frames, ConnectionId, Frame, Packet, TransportError, TransportResult,
};

use super::connection::{Connection, ConnectionTable};

/// Stream bytes released to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Connection the bytes arrived on.
    pub connection_id: ConnectionId,
    /// Stream identifier.
    pub stream_id: u64,
    /// Stream offset of the first byte of `data`.
    pub offset: u64,
    /// The bytes.
    pub data: Vec<u8>,
}

/// Counters kept by the receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Datagrams read from the transport.
    pub datagrams_received: u64,
    /// Connections created by an INIT.
    pub handshakes: u64,
    /// INITs for a known connection with an unchanged public value.
    pub repeated_inits: u64,
    /// INITs that replaced a known connection's key.
    pub rekeys: u64,
    /// Connections created from a 0RTT datagram.
    pub zero_rtt_accepted: u64,
    /// STREAM frames processed.
    pub stream_frames: u64,
    /// ACK frames sent.
    pub acks_sent: u64,
    /// Bytes released to the application.
    pub bytes_delivered: u64,
    /// Datagrams dropped as malformed.
    pub dropped_malformed: u64,
    /// DATA datagrams for unknown connections.
    pub dropped_unknown_connection: u64,
    /// Datagrams that failed authentication.
    pub dropped_unauthenticated: u64,
    /// Legacy ACK packets seen.
    pub legacy_acks: u64,
}

/// Peer-facing receive loop.
pub struct Receiver<T, C> {
    transport: T,
    clock: C,
    responder: Responder,
    connections: ConnectionTable,
    stats: ReceiverStats,
    recv_buf: Vec<u8>,
}

impl<T: DatagramTransport, C: Clock> Receiver<T, C> {
    /// Receiver answering handshakes with `responder`'s long-term key.
    pub fn new(transport: T, clock: C, responder: Responder) -> Self {
        Self::with_buffer_size(transport, clock, responder, DEFAULT_RECV_BUFFER_SIZE)
    }

    /// Receiver with a custom receive buffer size.
    pub fn with_buffer_size(transport: T, clock: C, responder: Responder, size: usize) -> Self {
        Self {
            transport,
            clock,
            responder,
            connections: ConnectionTable::new(),
            stats: ReceiverStats::default(),
            recv_buf: vec![0u8; size],
        }
    }

    /// Drain every waiting datagram. Returns the bytes released, in order
    /// per stream.
    pub fn poll(&mut self) -> TransportResult<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        loop {
            let (len, from) = match self.transport.try_recv_from(&mut self.recv_buf) {
                Ok(Some(got)) => got,
                Ok(None) => return Ok(deliveries),
                Err(e) => {
                    let e = TransportError::from(e);
                    if e.is_fatal() {
                        return Err(e);
                    }
                    tracing::debug!(error = %e, "transient receive error");
                    continue;
                }
            };
            let datagram = self.recv_buf[..len].to_vec();
            deliveries.extend(self.handle_datagram(&datagram, from)?);
        }
    }

    /// Process one datagram.
    ///
    /// Datagrams a peer may legitimately see discarded (malformed, unknown
    /// connection, failed authentication) are counted and yield nothing.
    /// Any other failure is returned.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        from: SocketAddr,
    ) -> TransportResult<Vec<Delivery>> {
        self.stats.datagrams_received += 1;
        match self.dispatch(datagram, from) {
            Ok(deliveries) => Ok(deliveries),
            Err(e) if e.is_silent_drop() => {
                match e {
                    TransportError::UnknownConnection => self.stats.dropped_unknown_connection += 1,
                    TransportError::AuthenticationFailed => self.stats.dropped_unauthenticated += 1,
                    _ => self.stats.dropped_malformed += 1,
                }
                tracing::debug!(%from, error = %e, "dropped datagram");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch(&mut self, datagram: &[u8], from: SocketAddr) -> TransportResult<Vec<Delivery>> {
        let now = self.clock.now();
        match Packet::parse(datagram)? {
            Packet::Init {
                connection_id,
                public_value,
            } => {
                let (key, accept) = self
                    .responder
                    .respond_to_init(connection_id, public_value)
                    .map_err(|_| TransportError::AuthenticationFailed)?;
                match self.connections.get_mut(&connection_id) {
                    // A retransmitted or replayed INIT must not reset delivery.
                    Some(conn) => {
                        conn.observe(from, now);
                        if conn.key() == &key {
                            self.stats.repeated_inits += 1;
                            tracing::debug!(%connection_id, peer = %from, "repeated INIT, ACCEPT re-sent");
                        } else {
                            conn.rekey(key);
                            self.stats.rekeys += 1;
                            tracing::info!(%connection_id, peer = %from, "connection re-keyed, streams kept");
                        }
                    }
                    None => {
                        self.connections
                            .insert(Connection::new(connection_id, key, from, now));
                        self.stats.handshakes += 1;
                        tracing::info!(%connection_id, peer = %from, "handshake complete, ACCEPT sent");
                    }
                }
                self.send(&accept, from);
                Ok(Vec::new())
            }
            Packet::ZeroRtt {
                connection_id,
                public_value,
                sealed,
            } => {
                if self.connections.contains(&connection_id) {
                    return self.receive_sealed(connection_id, sealed, from);
                }
                let key = self
                    .responder
                    .accept_zero_rtt(public_value)
                    .map_err(|_| TransportError::AuthenticationFailed)?;
                // Only an authentic first datagram creates the connection.
                let plaintext =
                    open(&key, sealed).map_err(|_| TransportError::AuthenticationFailed)?;
                self.connections
                    .insert(Connection::new(connection_id, key, from, now));
                self.stats.zero_rtt_accepted += 1;
                tracing::info!(%connection_id, peer = %from, "0-RTT connection created");
                self.receive_plaintext(connection_id, &plaintext, from)
            }
            Packet::Data {
                connection_id,
                sealed,
            } => self.receive_sealed(connection_id, sealed, from),
            Packet::LegacyAck {
                stream_id,
                sequence,
            } => {
                self.stats.legacy_acks += 1;
                tracing::debug!(%from, stream_id, sequence, "legacy ACK packet ignored");
                Ok(Vec::new())
            }
            Packet::Accept { connection_id, .. } => {
                tracing::debug!(%from, %connection_id, "unexpected ACCEPT ignored");
                Ok(Vec::new())
            }
        }
    }

    fn receive_sealed(
        &mut self,
        connection_id: ConnectionId,
        sealed: &[u8],
        from: SocketAddr,
    ) -> TransportResult<Vec<Delivery>> {
        let conn = self
            .connections
            .get(&connection_id)
            .ok_or(TransportError::UnknownConnection)?;
        let plaintext =
            open(conn.key(), sealed).map_err(|_| TransportError::AuthenticationFailed)?;
        self.receive_plaintext(connection_id, &plaintext, from)
    }

    fn receive_plaintext(
        &mut self,
        connection_id: ConnectionId,
        plaintext: &[u8],
        from: SocketAddr,
    ) -> TransportResult<Vec<Delivery>> {
        let (frames, _) = decode_frames(plaintext)?;
        let now = self.clock.now();

        let Some(conn) = self.connections.get_mut(&connection_id) else {
            return Err(TransportError::UnknownConnection);
        };
        conn.observe(from, now);
        let peer = conn.peer_addr();
        let key = conn.key().clone();

        let mut deliveries = Vec::new();
        for frame in frames {
            match frame {
                Frame::Stream {
                    stream_id,
                    offset,
                    data,
                } => {
                    self.stats.stream_frames += 1;
                    self.send_ack(connection_id, &key, stream_id, offset, peer);

                    let Some(conn) = self.connections.get_mut(&connection_id) else {
                        break;
                    };
                    let mut cursor = conn.stream(stream_id).map_or(0, |s| s.next_offset());
                    for chunk in conn.receive(stream_id, offset, data) {
                        tracing::trace!(%connection_id, stream_id, offset = cursor, len = chunk.len(), "delivered");
                        self.stats.bytes_delivered += chunk.len() as u64;
                        let len = chunk.len() as u64;
                        deliveries.push(Delivery {
                            connection_id,
                            stream_id,
                            offset: cursor,
                            data: chunk,
                        });
                        cursor += len;
                    }
                }
                Frame::Ack { stream_id, offset } => {
                    tracing::trace!(stream_id, offset, "ACK frame on receive side ignored");
                }
                Frame::Unknown(tag) => {
                    tracing::trace!(tag, "unknown frame skipped");
                }
            }
        }
        Ok(deliveries)
    }

    fn send_ack(
        &mut self,
        connection_id: ConnectionId,
        key: &SessionKey,
        stream_id: u64,
        offset: u64,
        peer: SocketAddr,
    ) {
        let datagram = Frame::ack(stream_id, offset)
            .to_bytes()
            .map_err(TransportError::from)
            .and_then(|plaintext| {
                seal(key, &plaintext).map_err(|_| TransportError::AuthenticationFailed)
            })
            .map(|sealed| {
                Packet::Data {
                    connection_id,
                    sealed: &sealed,
                }
                .to_bytes()
            });
        match datagram {
            Ok(datagram) => {
                if self.send(&datagram, peer) {
                    self.stats.acks_sent += 1;
                }
            }
            Err(e) => tracing::warn!(%connection_id, error = %e, "failed to build ACK"),
        }
    }

    fn send(&self, datagram: &[u8], to: SocketAddr) -> bool {
        match self.transport.send_to(datagram, to) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %to, error = %e, "send failed");
                false
            }
        }
    }

    /// The connection table.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Counters.
    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// The long-term responder.
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Local address of the transport.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }
}

impl<T, C> std::fmt::Debug for Receiver<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("connections", &self.connections.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::{ManualClock, PACKET_TYPE_ACCEPT, PACKET_TYPE_DATA};
    use crate::crypto::{DhKeyPair, Initiator, Session, ZeroRttInitiator};
    use crate::stream::{SenderConfig, SenderEngine};
    use crate::transport::{MemoryNetwork, MemoryTransport};

    struct Setup {
        receiver: Receiver<MemoryTransport, ManualClock>,
        client: MemoryTransport,
        network: MemoryNetwork,
        clock: ManualClock,
    }

    fn setup() -> Setup {
        let network = MemoryNetwork::new();
        let server = network.endpoint();
        let client = network.endpoint();
        let clock = ManualClock::new();
        let receiver = Receiver::new(server, clock.clone(), Responder::generate());
        Setup {
            receiver,
            client,
            network,
            clock,
        }
    }

    fn server_addr(s: &Setup) -> SocketAddr {
        s.receiver.local_addr().unwrap()
    }

    fn handshake(s: &mut Setup) -> Session {
        let initiator = Initiator::new();
        s.client.send_to(&initiator.init_packet(), server_addr(s)).unwrap();
        assert!(s.receiver.poll().unwrap().is_empty());

        let replies = s.client.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0[0], PACKET_TYPE_ACCEPT);
        initiator.complete(&replies[0].0).unwrap()
    }

    fn send_frames(s: &Setup, from: &MemoryTransport, session: &Session, frames: &[Frame]) {
        let plaintext = crate::transport::encode_frames(frames).unwrap();
        let sealed = seal(session.key(), &plaintext).unwrap();
        let datagram = Packet::Data {
            connection_id: session.connection_id(),
            sealed: &sealed,
        }
        .to_bytes();
        from.send_to(&datagram, server_addr(s)).unwrap();
    }

    fn acks_at(client: &MemoryTransport, session: &Session) -> Vec<Frame> {
        client
            .drain()
            .into_iter()
            .flat_map(|(datagram, _)| {
                let Packet::Data { sealed, .. } = Packet::parse(&datagram).unwrap() else {
                    panic!("expected DATA");
                };
                let plaintext = open(session.key(), sealed).unwrap();
                decode_frames(&plaintext).unwrap().0
            })
            .collect()
    }

    #[test]
    fn test_init_creates_connection() {
        let mut s = setup();
        let session = handshake(&mut s);
        assert_eq!(s.receiver.connections().len(), 1);
        assert!(s.receiver.connections().contains(&session.connection_id()));
        assert_eq!(s.receiver.stats().handshakes, 1);
        assert_eq!(session.peer_public(), s.receiver.responder().public_value());
    }

    #[test]
    fn test_data_acked_and_delivered() {
        let mut s = setup();
        let session = handshake(&mut s);

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 0, b"hello".to_vec())]);
        let deliveries = s.receiver.poll().unwrap();
        assert_eq!(
            deliveries,
            vec![Delivery {
                connection_id: session.connection_id(),
                stream_id: 1,
                offset: 0,
                data: b"hello".to_vec(),
            }]
        );
        assert_eq!(acks_at(&s.client, &session), vec![Frame::ack(1, 0)]);
    }

    #[test]
    fn test_out_of_order_across_datagrams() {
        let mut s = setup();
        let session = handshake(&mut s);

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 10, vec![2; 10])]);
        assert!(s.receiver.poll().unwrap().is_empty());
        // Acknowledged even though it is held back.
        assert_eq!(acks_at(&s.client, &session), vec![Frame::ack(1, 10)]);

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 0, vec![1; 10])]);
        let deliveries = s.receiver.poll().unwrap();
        let offsets: Vec<_> = deliveries.iter().map(|d| (d.offset, d.data.clone())).collect();
        assert_eq!(offsets, vec![(0, vec![1; 10]), (10, vec![2; 10])]);
    }

    #[test]
    fn test_multiple_frames_in_one_datagram() {
        let mut s = setup();
        let session = handshake(&mut s);

        send_frames(
            &s,
            &s.client,
            &session,
            &[
                Frame::stream(1, 0, b"a".to_vec()),
                Frame::Unknown(0x1f),
                Frame::stream(2, 0, b"b".to_vec()),
            ],
        );
        let deliveries = s.receiver.poll().unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(
            acks_at(&s.client, &session),
            vec![Frame::ack(1, 0), Frame::ack(2, 0)]
        );
    }

    #[test]
    fn test_acks_follow_migrated_address() {
        let mut s = setup();
        let session = handshake(&mut s);
        let roamed = s.network.endpoint();

        send_frames(&s, &roamed, &session, &[Frame::stream(1, 0, b"moved".to_vec())]);
        assert_eq!(s.receiver.poll().unwrap().len(), 1);

        assert!(s.client.drain().is_empty());
        assert_eq!(acks_at(&roamed, &session), vec![Frame::ack(1, 0)]);

        let conn = s.receiver.connections().get(&session.connection_id()).unwrap();
        assert_eq!(conn.peer_addr(), roamed.addr());
        assert_eq!(conn.migrations(), 1);
    }

    #[test]
    fn test_unknown_connection_dropped() {
        let mut s = setup();
        let stranger = handshake(&mut s);
        let mut other = setup();
        let foreign = handshake(&mut other);

        send_frames(&s, &s.client, &foreign, &[Frame::stream(1, 0, b"x".to_vec())]);
        assert!(s.receiver.poll().unwrap().is_empty());
        assert_eq!(s.receiver.stats().dropped_unknown_connection, 1);
        assert!(s.client.drain().is_empty());
        assert!(s.receiver.connections().contains(&stranger.connection_id()));
    }

    #[test]
    fn test_tampered_and_malformed_dropped() {
        let mut s = setup();
        let session = handshake(&mut s);
        let server = server_addr(&s);

        let plaintext = Frame::stream(1, 0, b"x".to_vec()).to_bytes().unwrap();
        let mut sealed = seal(session.key(), &plaintext).unwrap();
        sealed[15] ^= 0x40;
        let tampered = Packet::Data {
            connection_id: session.connection_id(),
            sealed: &sealed,
        }
        .to_bytes();
        s.client.send_to(&tampered, server).unwrap();
        s.client.send_to(&[0x01, 0, 0], server).unwrap();

        // Authentic but truncated frame payload.
        let mut truncated = Frame::stream(1, 0, b"abcdef".to_vec()).to_bytes().unwrap();
        truncated.pop();
        let sealed = seal(session.key(), &truncated).unwrap();
        let bad_frames = Packet::Data {
            connection_id: session.connection_id(),
            sealed: &sealed,
        }
        .to_bytes();
        s.client.send_to(&bad_frames, server).unwrap();

        assert!(s.receiver.poll().unwrap().is_empty());
        let stats = s.receiver.stats();
        assert_eq!(stats.dropped_unauthenticated, 1);
        assert_eq!(stats.dropped_malformed, 2);
        assert!(s.client.drain().is_empty());
    }

    #[test]
    fn test_zero_rtt_first_datagram_accepted() {
        let mut s = setup();
        let cached = *s.receiver.responder().public_value();
        let session = ZeroRttInitiator::from_cached(cached)
            .unwrap()
            .establish()
            .unwrap();

        let mut sender = SenderEngine::new(
            s.client.clone(),
            s.clock.clone(),
            session.clone(),
            server_addr(&s),
            SenderConfig::default(),
        );
        sender.write(4, b"early data");
        sender.poll().unwrap();

        let deliveries = s.receiver.poll().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].data, b"early data");
        assert_eq!(s.receiver.stats().zero_rtt_accepted, 1);
        assert!(s.receiver.connections().contains(&session.connection_id()));

        sender.poll().unwrap();
        assert!(sender.is_confirmed());
        assert!(sender.is_idle());
    }

    #[test]
    fn test_zero_rtt_garbage_creates_nothing() {
        let mut s = setup();
        let attacker = crate::crypto::DhKeyPair::generate();
        let datagram = Packet::ZeroRtt {
            connection_id: ConnectionId::generate(),
            public_value: attacker.public_value(),
            sealed: &[0u8; 64],
        }
        .to_bytes();
        s.client.send_to(&datagram, server_addr(&s)).unwrap();

        assert!(s.receiver.poll().unwrap().is_empty());
        assert!(s.receiver.connections().is_empty());
        assert_eq!(s.receiver.stats().dropped_unauthenticated, 1);
    }

    #[test]
    fn test_legacy_ack_and_stray_accept_ignored() {
        let mut s = setup();
        let server = server_addr(&s);
        s.client
            .send_to(&Packet::LegacyAck { stream_id: 2, sequence: 7 }.to_bytes(), server)
            .unwrap();
        let accept = Packet::Accept {
            connection_id: ConnectionId::generate(),
            public_value: s.receiver.responder().public_value(),
        }
        .to_bytes();
        s.client.send_to(&accept, server).unwrap();

        assert!(s.receiver.poll().unwrap().is_empty());
        let stats = s.receiver.stats();
        assert_eq!(stats.legacy_acks, 1);
        assert_eq!(stats.datagrams_received, 2);
        assert_eq!(stats.dropped_malformed, 0);
    }

    fn delivered(deliveries: &[Delivery]) -> Vec<(u64, Vec<u8>)> {
        deliveries.iter().map(|d| (d.offset, d.data.clone())).collect()
    }

    #[test]
    fn test_replayed_init_keeps_stream_cursor() {
        let mut s = setup();
        let server = server_addr(&s);
        let initiator = Initiator::new();
        let init = initiator.init_packet();
        s.client.send_to(&init, server).unwrap();
        assert!(s.receiver.poll().unwrap().is_empty());
        let accept = s.client.drain().remove(0).0;
        let session = initiator.complete(&accept).unwrap();

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 0, b"hello".to_vec())]);
        assert_eq!(delivered(&s.receiver.poll().unwrap()), vec![(0, b"hello".to_vec())]);
        acks_at(&s.client, &session);

        // The same INIT again, mid-stream: ACCEPT is re-sent, nothing resets.
        s.client.send_to(&init, server).unwrap();
        assert!(s.receiver.poll().unwrap().is_empty());
        let replies = s.client.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0[0], PACKET_TYPE_ACCEPT);
        assert_eq!(initiator.complete(&replies[0].0).unwrap().key(), session.key());

        let stats = s.receiver.stats();
        assert_eq!(stats.handshakes, 1);
        assert_eq!(stats.repeated_inits, 1);
        assert_eq!(stats.rekeys, 0);

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 5, b"world".to_vec())]);
        assert_eq!(delivered(&s.receiver.poll().unwrap()), vec![(5, b"world".to_vec())]);
        acks_at(&s.client, &session);

        // A resend of already delivered bytes is acknowledged, not delivered.
        send_frames(&s, &s.client, &session, &[Frame::stream(1, 0, b"hello".to_vec())]);
        assert!(s.receiver.poll().unwrap().is_empty());
        assert_eq!(acks_at(&s.client, &session), vec![Frame::ack(1, 0)]);

        let conn = s.receiver.connections().get(&session.connection_id()).unwrap();
        assert_eq!(conn.stream(1).unwrap().next_offset(), 10);
        assert_eq!(s.receiver.stats().bytes_delivered, 10);
    }

    #[test]
    fn test_init_with_new_public_value_rekeys() {
        let mut s = setup();
        let old = handshake(&mut s);
        send_frames(&s, &s.client, &old, &[Frame::stream(1, 0, b"hello".to_vec())]);
        assert_eq!(s.receiver.poll().unwrap().len(), 1);
        acks_at(&s.client, &old);

        let fresh = Initiator::with_keypair(old.connection_id(), DhKeyPair::generate());
        s.client.send_to(&fresh.init_packet(), server_addr(&s)).unwrap();
        assert!(s.receiver.poll().unwrap().is_empty());
        let accept = s.client.drain().remove(0).0;
        let session = fresh.complete(&accept).unwrap();
        assert_ne!(session.key(), old.key());

        let stats = s.receiver.stats();
        assert_eq!(stats.handshakes, 1);
        assert_eq!(stats.rekeys, 1);
        assert_eq!(s.receiver.connections().len(), 1);

        send_frames(&s, &s.client, &session, &[Frame::stream(1, 5, b"world".to_vec())]);
        assert_eq!(delivered(&s.receiver.poll().unwrap()), vec![(5, b"world".to_vec())]);
        assert_eq!(acks_at(&s.client, &session), vec![Frame::ack(1, 5)]);

        // The replaced key no longer authenticates.
        send_frames(&s, &s.client, &old, &[Frame::stream(1, 10, b"!".to_vec())]);
        assert!(s.receiver.poll().unwrap().is_empty());
        assert_eq!(s.receiver.stats().dropped_unauthenticated, 1);
    }

    #[test]
    fn test_handle_datagram_drops_garbage_quietly() {
        let mut s = setup();
        let from = s.client.addr();
        assert!(s.receiver.handle_datagram(&[0x7f, 1, 2], from).unwrap().is_empty());
        assert!(s.receiver.handle_datagram(&[], from).unwrap().is_empty());
        assert_eq!(s.receiver.stats().dropped_malformed, 2);
        assert_eq!(s.receiver.stats().datagrams_received, 2);
    }

    #[test]
    fn test_lossy_transfer_recovers_after_timeout() {
        let mut s = setup();
        let session = handshake(&mut s);

        // Lose the first STREAM datagram and the first ACK datagram.
        let client = s.client.addr();
        let mut lost_stream = false;
        let mut lost_ack = false;
        s.network.set_drop_filter(move |from, _to, datagram| {
            if datagram.first() != Some(&PACKET_TYPE_DATA) {
                return false;
            }
            let lost = if from == client {
                &mut lost_stream
            } else {
                &mut lost_ack
            };
            !std::mem::replace(lost, true)
        });

        let mut sender = SenderEngine::new(
            s.client.clone(),
            s.clock.clone(),
            session,
            server_addr(&s),
            SenderConfig::default().with_chunk_size(2),
        );
        sender.write(1, b"abcdef");
        let past_timeout = Duration::from_millis(2100);
        let mut deliveries = Vec::new();

        sender.poll().unwrap();
        assert!(s.receiver.poll().unwrap().is_empty());

        // The resend arrives; its ACK is lost.
        s.clock.advance(past_timeout);
        sender.poll().unwrap();
        deliveries.extend(s.receiver.poll().unwrap());
        sender.poll().unwrap();
        assert_eq!(sender.in_flight(), 1);
        assert_eq!(sender.stats().acks_matched, 0);

        // The second resend is a duplicate at the receiver but is acknowledged.
        s.clock.advance(past_timeout);
        sender.poll().unwrap();
        deliveries.extend(s.receiver.poll().unwrap());
        assert_eq!(deliveries.len(), 1);

        for _ in 0..3 {
            sender.poll().unwrap();
            deliveries.extend(s.receiver.poll().unwrap());
        }
        assert!(sender.is_idle());

        assert_eq!(
            delivered(&deliveries),
            vec![
                (0, b"ab".to_vec()),
                (2, b"cd".to_vec()),
                (4, b"ef".to_vec()),
            ]
        );

        let stats = sender.stats();
        assert_eq!(stats.retransmissions, 2);
        assert_eq!(stats.datagrams_sent, 5);
        assert_eq!(stats.acks_matched, 3);
        assert_eq!(stats.duplicate_acks, 0);
        assert_eq!(stats.bytes_acked, 6);
        assert_eq!(s.network.dropped(), 2);

        let received = s.receiver.stats();
        assert_eq!(received.stream_frames, 4);
        assert_eq!(received.acks_sent, 4);
        assert_eq!(received.bytes_delivered, 6);
    }
}
