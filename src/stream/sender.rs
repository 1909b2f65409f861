//! Sender engine.
//!
//! Chunks application writes into STREAM frames, paces them against the
//! congestion controller's window and interval, matches ACK frames against
//! the in-flight table, and resends anything left unacknowledged past the
//! retransmission timeout.
//!
//! The engine never blocks. Each [`SenderEngine::poll`] call is one loop
//! iteration:
//!
//! 1. drain every waiting datagram and process ACKs
//! 2. ask the controller for a fresh decision
//! 3. resend expired frames
//! 4. send new chunks while the window and pacing allow

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::congestion::{Bbr, BbrState, CongestionController, CongestionDecision};
use crate::core::{
    Clock, DatagramTransport, DEFAULT_CHUNK_SIZE, DEFAULT_RECV_BUFFER_SIZE, RETRANSMIT_TIMEOUT,
};
use crate::crypto::{open, seal, Session};
use crate::transport::{decode_frames, Frame, Packet, TransportError, TransportResult};

use super::pending::{FrameKey, PendingSends};

/// Sender tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Maximum payload bytes per STREAM frame.
    pub chunk_size: usize,
    /// How long a frame may stay unacknowledged before it is resent.
    pub retransmit_timeout: Duration,
    /// Receive buffer size for incoming datagrams.
    pub recv_buffer_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retransmit_timeout: RETRANSMIT_TIMEOUT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl SenderConfig {
    /// Set the chunk size (at least 1).
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the retransmission timeout.
    pub fn with_retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit_timeout = timeout;
        self
    }

    /// Set the receive buffer size.
    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }
}

/// Counters kept by the sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Datagrams handed to the transport, retransmissions included.
    pub datagrams_sent: u64,
    /// Timeout-driven resends.
    pub retransmissions: u64,
    /// ACKs that matched an in-flight frame.
    pub acks_matched: u64,
    /// ACKs for frames no longer (or never) in flight.
    pub duplicate_acks: u64,
    /// Application bytes accepted by [`SenderEngine::write`].
    pub bytes_queued: u64,
    /// Application bytes acknowledged by the peer.
    pub bytes_acked: u64,
    /// Incoming datagrams dropped as malformed, foreign or unauthenticated.
    pub datagrams_dropped: u64,
}

struct Chunk {
    stream_id: u64,
    offset: u64,
    data: Vec<u8>,
}

/// One side of a connection that sends stream data.
pub struct SenderEngine<T, C, K = Bbr> {
    transport: T,
    clock: C,
    controller: K,
    session: Session,
    peer: SocketAddr,
    config: SenderConfig,
    next_offsets: HashMap<u64, u64>,
    outbox: VecDeque<Chunk>,
    pending: PendingSends,
    decision: CongestionDecision,
    last_send: Option<Instant>,
    confirmed: bool,
    stats: SenderStats,
    recv_buf: Vec<u8>,
}

impl<T: DatagramTransport, C: Clock> SenderEngine<T, C, Bbr> {
    /// Engine with a fresh [`Bbr`] controller.
    pub fn new(transport: T, clock: C, session: Session, peer: SocketAddr, config: SenderConfig) -> Self {
        Self::with_controller(transport, clock, session, peer, config, Bbr::new())
    }
}

impl<T, C, K> SenderEngine<T, C, K>
where
    T: DatagramTransport,
    C: Clock,
    K: CongestionController,
{
    /// Engine with a caller-supplied congestion controller.
    pub fn with_controller(
        transport: T,
        clock: C,
        session: Session,
        peer: SocketAddr,
        config: SenderConfig,
        mut controller: K,
    ) -> Self {
        let decision = controller.update(clock.now());
        let recv_buf = vec![0u8; config.recv_buffer_size];
        Self {
            transport,
            clock,
            controller,
            confirmed: !session.is_zero_rtt(),
            session,
            peer,
            config,
            next_offsets: HashMap::new(),
            outbox: VecDeque::new(),
            pending: PendingSends::new(),
            decision,
            last_send: None,
            stats: SenderStats::default(),
            recv_buf,
        }
    }

    /// Queue `data` on `stream_id`. Returns the stream offset of its first byte.
    pub fn write(&mut self, stream_id: u64, data: &[u8]) -> u64 {
        let next = self.next_offsets.entry(stream_id).or_insert(0);
        let start = *next;
        for chunk in data.chunks(self.config.chunk_size.max(1)) {
            self.outbox.push_back(Chunk {
                stream_id,
                offset: *next,
                data: chunk.to_vec(),
            });
            *next += chunk.len() as u64;
        }
        self.stats.bytes_queued += data.len() as u64;
        start
    }

    /// Run one loop iteration.
    ///
    /// Fatal transport failures are returned. Incoming datagrams that are
    /// malformed, foreign or unauthenticated are counted and dropped.
    pub fn poll(&mut self) -> TransportResult<()> {
        self.drain_incoming()?;

        let now = self.clock.now();
        let decision = self.controller.update(now);
        if decision.rtprop_reset {
            tracing::warn!(
                connection_id = %self.session.connection_id(),
                rtprop_ms = decision.rtprop.as_secs_f64() * 1e3,
                "rtprop reset after prolonged drain"
            );
        }
        self.decision = decision;

        self.retransmit_expired(now);
        self.send_new(now);
        Ok(())
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.outbox.is_empty() && self.pending.is_empty()
    }

    /// Frames sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Chunks waiting for window space.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Whether the peer has acknowledged anything yet.
    ///
    /// Until it has, a 0-RTT session keeps tagging datagrams 0RTT.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Counters.
    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Most recent controller decision.
    pub fn decision(&self) -> &CongestionDecision {
        &self.decision
    }

    /// Current controller state.
    pub fn congestion_state(&self) -> BbrState {
        self.decision.state
    }

    /// Session this engine sends on.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Peer address datagrams are sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The in-flight table.
    pub fn pending(&self) -> &PendingSends {
        &self.pending
    }

    /// Local address of the transport.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Swap in a new transport (e.g. a socket on a new local port) and keep
    /// the connection. Returns the old transport.
    pub fn migrate(&mut self, transport: T) -> T {
        let old = std::mem::replace(&mut self.transport, transport);
        tracing::info!(
            connection_id = %self.session.connection_id(),
            local = ?self.transport.local_addr().ok(),
            "sender switched transport"
        );
        old
    }

    /// Drop all queued and in-flight data without further retransmission.
    /// Returns how many frames were abandoned.
    pub fn abandon(&mut self) -> usize {
        let abandoned = self.pending.clear() + self.outbox.len();
        self.outbox.clear();
        if abandoned > 0 {
            tracing::info!(
                connection_id = %self.session.connection_id(),
                abandoned,
                "sender stopped with unacknowledged data"
            );
        }
        abandoned
    }

    fn drain_incoming(&mut self) -> TransportResult<()> {
        loop {
            let (len, from) = match self.transport.try_recv_from(&mut self.recv_buf) {
                Ok(Some(got)) => got,
                Ok(None) => return Ok(()),
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
            match self.handle_datagram(&datagram, from) {
                Ok(()) => {}
                Err(e) if e.is_silent_drop() => {
                    self.stats.datagrams_dropped += 1;
                    tracing::debug!(%from, error = %e, "dropped datagram");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Process one incoming datagram.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> TransportResult<()> {
        match Packet::parse(datagram)? {
            Packet::Data {
                connection_id,
                sealed,
            } => {
                if connection_id != self.session.connection_id() {
                    return Err(TransportError::UnknownConnection);
                }
                let plaintext = open(self.session.key(), sealed)
                    .map_err(|_| TransportError::AuthenticationFailed)?;
                let (frames, _) = decode_frames(&plaintext)?;
                let now = self.clock.now();
                for frame in frames {
                    self.handle_frame(frame, now);
                }
            }
            Packet::LegacyAck {
                stream_id,
                sequence,
            } => {
                tracing::debug!(%from, stream_id, sequence, "legacy ACK packet ignored");
            }
            Packet::Accept { connection_id, .. } => {
                tracing::debug!(%from, %connection_id, "unexpected ACCEPT ignored");
            }
            other => {
                tracing::debug!(%from, packet_type = ?other.packet_type(), "packet not for a sender");
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame, now: Instant) {
        match frame {
            Frame::Ack { stream_id, offset } => {
                match self.pending.acknowledge(stream_id, offset, now) {
                    Some((rtt, entry)) => {
                        self.controller.on_rtt_sample(rtt);
                        self.stats.acks_matched += 1;
                        self.stats.bytes_acked += entry.payload.len() as u64;
                        tracing::trace!(stream_id, offset, rtt_us = rtt.as_micros() as u64, "ack");
                        if !self.confirmed {
                            self.confirmed = true;
                            tracing::info!(
                                connection_id = %self.session.connection_id(),
                                "0-RTT data acknowledged, switching to DATA packets"
                            );
                        }
                    }
                    None => {
                        self.stats.duplicate_acks += 1;
                        tracing::debug!(stream_id, offset, "duplicate ACK");
                    }
                }
            }
            Frame::Stream { stream_id, .. } => {
                tracing::trace!(stream_id, "STREAM frame on send side ignored");
            }
            Frame::Unknown(tag) => {
                tracing::trace!(tag, "unknown frame skipped");
            }
        }
    }

    fn retransmit_expired(&mut self, now: Instant) {
        for key in self.pending.expired(now, self.config.retransmit_timeout) {
            let Some(entry) = self.pending.mark_resent(key, now) else {
                continue;
            };
            let payload = entry.payload.clone();
            let attempt = entry.retransmits;
            tracing::info!(
                connection_id = %self.session.connection_id(),
                stream_id = key.0,
                offset = key.1,
                attempt,
                "retransmitting after timeout"
            );
            self.stats.retransmissions += 1;
            self.transmit(key, payload);
        }
    }

    fn send_new(&mut self, now: Instant) {
        while (self.pending.len() as u64) < u64::from(self.decision.cwnd) {
            if let Some(last) = self.last_send {
                if now.saturating_duration_since(last) < self.decision.pacing_interval {
                    break;
                }
            }
            let Some(chunk) = self.outbox.pop_front() else {
                break;
            };
            let key = (chunk.stream_id, chunk.offset);
            self.pending.insert(chunk.stream_id, chunk.offset, chunk.data.clone(), now);
            self.transmit(key, chunk.data);
            self.last_send = Some(now);
        }
    }

    fn transmit(&mut self, (stream_id, offset): FrameKey, payload: Vec<u8>) {
        let datagram = match self.build_datagram(Frame::stream(stream_id, offset, payload)) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::warn!(stream_id, offset, error = %e, "failed to build datagram");
                return;
            }
        };
        match self.transport.send_to(&datagram, self.peer) {
            Ok(()) => self.stats.datagrams_sent += 1,
            Err(e) => {
                // Left in flight; the retransmission timer covers it.
                tracing::warn!(peer = %self.peer, error = %e, "send failed");
            }
        }
    }

    fn build_datagram(&self, frame: Frame) -> TransportResult<Vec<u8>> {
        let plaintext = frame.to_bytes()?;
        let sealed = seal(self.session.key(), &plaintext)
            .map_err(|_| TransportError::AuthenticationFailed)?;
        let connection_id = self.session.connection_id();

        let packet = match self.session.zero_rtt_public() {
            Some(public_value) if !self.confirmed => Packet::ZeroRtt {
                connection_id,
                public_value,
                sealed: &sealed,
            },
            _ => Packet::Data {
                connection_id,
                sealed: &sealed,
            },
        };
        Ok(packet.to_bytes())
    }
}

impl<T, C, K> std::fmt::Debug for SenderEngine<T, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderEngine")
            .field("connection_id", &self.session.connection_id())
            .field("peer", &self.peer)
            .field("in_flight", &self.pending.len())
            .field("queued", &self.outbox.len())
            .field("confirmed", &self.confirmed)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
