//! INIT/ACCEPT key exchange and the 0-RTT shortcut.
//!
//! Full handshake:
//!
//! ```text
//! Initiator                               Responder
//!   INIT   (conn_id, g^a)  ───────────────▶
//!          ◀─────────────── ACCEPT (conn_id, g^s)
//!   key = SHA-256(g^as)                   key = SHA-256(g^as)
//! ```
//!
//! The responder answers with its long-term value `g^s`. An initiator that
//! cached `g^s` from an earlier ACCEPT can derive the key immediately and
//! attach a fresh `g^a` to its first data datagram (0RTT packet type).
//!
//! The exchange is unauthenticated: it bootstraps encryption, it does not
//! stop an active man-in-the-middle.

use crate::core::{CryptoError, HandshakeError, DH_PUBLIC_SIZE};
use crate::transport::{ConnectionId, Packet};

use super::aead::SessionKey;
use super::dh::DhKeyPair;

/// Keys and identity for one established connection.
#[derive(Clone)]
pub struct Session {
    connection_id: ConnectionId,
    key: SessionKey,
    peer_public: [u8; DH_PUBLIC_SIZE],
    zero_rtt_public: Option<[u8; DH_PUBLIC_SIZE]>,
}

impl Session {
    /// Connection ID chosen by the initiator.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Derived symmetric key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Responder's public value (what a client caches for later 0-RTT).
    pub fn peer_public(&self) -> &[u8; DH_PUBLIC_SIZE] {
        &self.peer_public
    }

    /// Our public value to attach to 0RTT datagrams, if this session was
    /// keyed without a round trip.
    pub fn zero_rtt_public(&self) -> Option<&[u8; DH_PUBLIC_SIZE]> {
        self.zero_rtt_public.as_ref()
    }

    /// Whether the session was keyed from a cached responder value.
    pub fn is_zero_rtt(&self) -> bool {
        self.zero_rtt_public.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("zero_rtt", &self.is_zero_rtt())
            .finish_non_exhaustive()
    }
}

/// Initiator side of the full handshake.
#[derive(Debug)]
pub struct Initiator {
    connection_id: ConnectionId,
    keypair: DhKeyPair,
}

impl Initiator {
    /// Fresh connection ID and ephemeral keypair.
    pub fn new() -> Self {
        Self::with_keypair(ConnectionId::generate(), DhKeyPair::generate())
    }

    /// Use an explicit connection ID and keypair.
    pub fn with_keypair(connection_id: ConnectionId, keypair: DhKeyPair) -> Self {
        Self {
            connection_id,
            keypair,
        }
    }

    /// Connection ID carried in INIT.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Serialized INIT datagram.
    pub fn init_packet(&self) -> Vec<u8> {
        Packet::Init {
            connection_id: self.connection_id,
            public_value: self.keypair.public_value(),
        }
        .to_bytes()
    }

    /// Finish the handshake with a received datagram.
    ///
    /// Anything other than an ACCEPT echoing our connection ID is an error;
    /// callers waiting on a deadline should ignore it and keep listening.
    pub fn complete(&self, datagram: &[u8]) -> Result<Session, HandshakeError> {
        let packet = Packet::parse(datagram).map_err(|_| HandshakeError::Malformed)?;
        let Packet::Accept {
            connection_id,
            public_value,
        } = packet
        else {
            return Err(HandshakeError::UnexpectedPacket(
                packet.packet_type().as_byte(),
            ));
        };
        if connection_id != self.connection_id {
            return Err(HandshakeError::ConnectionIdMismatch);
        }

        let key = self.keypair.diffie_hellman(public_value)?.derive_session_key();
        Ok(Session {
            connection_id,
            key,
            peer_public: *public_value,
            zero_rtt_public: None,
        })
    }
}

impl Default for Initiator {
    fn default() -> Self {
        Self::new()
    }
}

/// Initiator side of the abbreviated handshake.
#[derive(Debug)]
pub struct ZeroRttInitiator {
    connection_id: ConnectionId,
    keypair: DhKeyPair,
    cached: [u8; DH_PUBLIC_SIZE],
}

impl ZeroRttInitiator {
    /// Key a new connection from a cached responder value.
    pub fn from_cached(cached: [u8; DH_PUBLIC_SIZE]) -> Result<Self, CryptoError> {
        Self::with_keypair(ConnectionId::generate(), DhKeyPair::generate(), cached)
    }

    /// Use an explicit connection ID and keypair.
    pub fn with_keypair(
        connection_id: ConnectionId,
        keypair: DhKeyPair,
        cached: [u8; DH_PUBLIC_SIZE],
    ) -> Result<Self, CryptoError> {
        super::dh::validate_public_value(&cached)?;
        Ok(Self {
            connection_id,
            keypair,
            cached,
        })
    }

    /// Derive the session. No network traffic is needed.
    pub fn establish(self) -> Result<Session, CryptoError> {
        let key = self.keypair.diffie_hellman(&self.cached)?.derive_session_key();
        Ok(Session {
            connection_id: self.connection_id,
            key,
            peer_public: self.cached,
            zero_rtt_public: Some(*self.keypair.public_value()),
        })
    }
}

/// Responder side: answers INIT and keys 0RTT connections.
///
/// Holds the long-term keypair whose public value clients cache.
#[derive(Debug, Clone)]
pub struct Responder {
    static_key: DhKeyPair,
}

impl Responder {
    /// Responder with the given long-term keypair.
    pub fn new(static_key: DhKeyPair) -> Self {
        Self { static_key }
    }

    /// Responder with a throwaway keypair.
    pub fn generate() -> Self {
        Self::new(DhKeyPair::generate())
    }

    /// Long-term public value sent in every ACCEPT.
    pub fn public_value(&self) -> &[u8; DH_PUBLIC_SIZE] {
        self.static_key.public_value()
    }

    /// Answer an INIT. Returns the session key and the ACCEPT datagram.
    pub fn respond_to_init(
        &self,
        connection_id: ConnectionId,
        peer_public: &[u8; DH_PUBLIC_SIZE],
    ) -> Result<(SessionKey, Vec<u8>), CryptoError> {
        let key = self.static_key.diffie_hellman(peer_public)?.derive_session_key();
        let accept = Packet::Accept {
            connection_id,
            public_value: self.static_key.public_value(),
        }
        .to_bytes();
        Ok((key, accept))
    }

    /// Derive the key for a 0RTT datagram's attached public value.
    pub fn accept_zero_rtt(
        &self,
        peer_public: &[u8; DH_PUBLIC_SIZE],
    ) -> Result<SessionKey, CryptoError> {
        Ok(self.static_key.diffie_hellman(peer_public)?.derive_session_key())
    }
}
