//! UDP payload framing.
//!
//! The first byte of every datagram selects the packet type:
//!
//! ```text
//! 0x01 DATA    | conn_id (8) | nonce (12) || ciphertext
//! 0x02 ACK     | stream_id (1) | sequence (2, BE)          (legacy)
//! 0x03 INIT    | conn_id (8) | DH public (256, BE)
//! 0x04 ACCEPT  | conn_id (8) | DH public (256, BE)
//! 0x05 0RTT    | conn_id (8) | DH public (256, BE) | nonce (12) || ciphertext
//! ```

use std::fmt;

use rand::{rngs::OsRng, RngCore};

use crate::core::{
    CONNECTION_ID_SIZE, DH_PUBLIC_SIZE, LEGACY_ACK_SIZE, PACKET_TYPE_ACCEPT, PACKET_TYPE_ACK,
    PACKET_TYPE_DATA, PACKET_TYPE_INIT, PACKET_TYPE_ZERO_RTT,
};

use super::error::PacketError;

/// Connection identifier (8 bytes).
///
/// Chosen at random by the initiator; it, not the source address, names the
/// connection, which is what lets a peer change address mid-connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId([u8; CONNECTION_ID_SIZE]);

impl ConnectionId {
    /// Generate a new random connection ID.
    pub fn generate() -> Self {
        let mut id = [0u8; CONNECTION_ID_SIZE];
        OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// Create a connection ID from bytes.
    pub fn from_bytes(bytes: [u8; CONNECTION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the connection ID as bytes.
    pub fn as_bytes(&self) -> &[u8; CONNECTION_ID_SIZE] {
        &self.0
    }

    fn read(data: &[u8]) -> Self {
        let mut id = [0u8; CONNECTION_ID_SIZE];
        id.copy_from_slice(&data[..CONNECTION_ID_SIZE]);
        Self(id)
    }
}

impl AsRef<[u8]> for ConnectionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", hex::encode(self.0))
    }
}

/// Packet type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Encrypted frames.
    Data = PACKET_TYPE_DATA,
    /// Legacy stream/sequence acknowledgment.
    Ack = PACKET_TYPE_ACK,
    /// Handshake initiation.
    Init = PACKET_TYPE_INIT,
    /// Handshake response.
    Accept = PACKET_TYPE_ACCEPT,
    /// Encrypted frames plus the initiator's DH public value.
    ZeroRtt = PACKET_TYPE_ZERO_RTT,
}

impl PacketType {
    /// Parse packet type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            PACKET_TYPE_DATA => Some(Self::Data),
            PACKET_TYPE_ACK => Some(Self::Ack),
            PACKET_TYPE_INIT => Some(Self::Init),
            PACKET_TYPE_ACCEPT => Some(Self::Accept),
            PACKET_TYPE_ZERO_RTT => Some(Self::ZeroRtt),
            _ => None,
        }
    }

    /// Convert packet type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Minimum datagram size for this type, tag included.
    pub fn min_len(self) -> usize {
        match self {
            Self::Data => 1 + CONNECTION_ID_SIZE,
            Self::Ack => LEGACY_ACK_SIZE,
            Self::Init | Self::Accept | Self::ZeroRtt => 1 + CONNECTION_ID_SIZE + DH_PUBLIC_SIZE,
        }
    }
}

/// A parsed datagram, borrowing from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Encrypted frames for an established connection.
    Data {
        /// Connection the frames belong to.
        connection_id: ConnectionId,
        /// `nonce || ciphertext`.
        sealed: &'a [u8],
    },
    /// Legacy acknowledgment.
    LegacyAck {
        /// Stream identifier.
        stream_id: u8,
        /// Sequence number.
        sequence: u16,
    },
    /// Handshake initiation.
    Init {
        /// Initiator's connection ID.
        connection_id: ConnectionId,
        /// Initiator's DH public value.
        public_value: &'a [u8; DH_PUBLIC_SIZE],
    },
    /// Handshake response.
    Accept {
        /// Echo of the initiator's connection ID.
        connection_id: ConnectionId,
        /// Responder's DH public value.
        public_value: &'a [u8; DH_PUBLIC_SIZE],
    },
    /// First-flight data keyed from a cached responder value.
    ZeroRtt {
        /// Initiator's connection ID.
        connection_id: ConnectionId,
        /// Initiator's fresh DH public value.
        public_value: &'a [u8; DH_PUBLIC_SIZE],
        /// `nonce || ciphertext`.
        sealed: &'a [u8],
    },
}

impl<'a> Packet<'a> {
    /// Parse a datagram.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        let &tag = data.first().ok_or(PacketError::Empty)?;
        let packet_type = PacketType::from_byte(tag).ok_or(PacketError::UnknownType(tag))?;

        let min = packet_type.min_len();
        if data.len() < min {
            return Err(PacketError::TooShort {
                expected: min,
                actual: data.len(),
            });
        }

        let body = &data[1..];
        let packet = match packet_type {
            PacketType::Data => Packet::Data {
                connection_id: ConnectionId::read(body),
                sealed: &body[CONNECTION_ID_SIZE..],
            },
            PacketType::Ack => Packet::LegacyAck {
                stream_id: body[0],
                sequence: u16::from_be_bytes([body[1], body[2]]),
            },
            PacketType::Init => Packet::Init {
                connection_id: ConnectionId::read(body),
                public_value: public_value(body)?,
            },
            PacketType::Accept => Packet::Accept {
                connection_id: ConnectionId::read(body),
                public_value: public_value(body)?,
            },
            PacketType::ZeroRtt => Packet::ZeroRtt {
                connection_id: ConnectionId::read(body),
                public_value: public_value(body)?,
                sealed: &body[CONNECTION_ID_SIZE + DH_PUBLIC_SIZE..],
            },
        };
        Ok(packet)
    }

    /// Packet type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Data { .. } => PacketType::Data,
            Packet::LegacyAck { .. } => PacketType::Ack,
            Packet::Init { .. } => PacketType::Init,
            Packet::Accept { .. } => PacketType::Accept,
            Packet::ZeroRtt { .. } => PacketType::ZeroRtt,
        }
    }

    /// Connection ID carried by the packet, if its type has one.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Packet::Data { connection_id, .. }
            | Packet::Init { connection_id, .. }
            | Packet::Accept { connection_id, .. }
            | Packet::ZeroRtt { connection_id, .. } => Some(*connection_id),
            Packet::LegacyAck { .. } => None,
        }
    }

    /// Serialize to a datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.packet_type().min_len() + self.sealed_len());
        out.push(self.packet_type().as_byte());
        match self {
            Packet::Data {
                connection_id,
                sealed,
            } => {
                out.extend_from_slice(connection_id.as_bytes());
                out.extend_from_slice(sealed);
            }
            Packet::LegacyAck {
                stream_id,
                sequence,
            } => {
                out.push(*stream_id);
                out.extend_from_slice(&sequence.to_be_bytes());
            }
            Packet::Init {
                connection_id,
                public_value,
            }
            | Packet::Accept {
                connection_id,
                public_value,
            } => {
                out.extend_from_slice(connection_id.as_bytes());
                out.extend_from_slice(&public_value[..]);
            }
            Packet::ZeroRtt {
                connection_id,
                public_value,
                sealed,
            } => {
                out.extend_from_slice(connection_id.as_bytes());
                out.extend_from_slice(&public_value[..]);
                out.extend_from_slice(sealed);
            }
        }
        out
    }

    fn sealed_len(&self) -> usize {
        match self {
            Packet::Data { sealed, .. } | Packet::ZeroRtt { sealed, .. } => sealed.len(),
            _ => 0,
        }
    }
}

fn public_value(body: &[u8]) -> Result<&[u8; DH_PUBLIC_SIZE], PacketError> {
    body.get(CONNECTION_ID_SIZE..CONNECTION_ID_SIZE + DH_PUBLIC_SIZE)
        .and_then(|v| v.try_into().ok())
        .ok_or(PacketError::TooShort {
            expected: 1 + CONNECTION_ID_SIZE + DH_PUBLIC_SIZE,
            actual: body.len() + 1,
        })
}
