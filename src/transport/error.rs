//! Transport layer error types.
//!
//! Nearly every error here ends in a silent drop: a malformed or
//! unauthenticated datagram is treated exactly like a lost one.

use std::io;

use thiserror::Error;

/// Errors from the varint and frame codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes remain than the encoding requires.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Negative values have no varint encoding.
    #[error("invalid varint value: {0}")]
    InvalidValue(i64),

    /// Value exceeds 2^62 - 1.
    #[error("value {0} too large for varint")]
    ValueTooLarge(u64),
}

/// Errors from parsing the outer UDP payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Zero-length datagram.
    #[error("empty datagram")]
    Empty,

    /// Datagram shorter than its fixed header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Unrecognised packet type tag.
    #[error("unknown packet type: 0x{0:02x}")]
    UnknownType(u8),
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Frame codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Packet parsing error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// DATA packet for a connection ID nobody knows.
    #[error("unknown connection")]
    UnknownConnection,

    /// AEAD tag did not verify.
    #[error("authentication failed")]
    AuthenticationFailed,
}

impl TransportError {
    /// Check if this error should result in a silent drop of the datagram.
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            TransportError::Codec(_)
                | TransportError::Packet(_)
                | TransportError::UnknownConnection
                | TransportError::AuthenticationFailed
        )
    }

    /// Check if this error should stop the loop that hit it.
    ///
    /// Would-block and ICMP-induced receive errors are not fatal: the next
    /// read on the socket is unaffected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Io(e) if e.kind() != io::ErrorKind::WouldBlock && !is_transient_io(e)
        )
    }
}

/// Receive errors that ICMP feedback can raise on an unconnected UDP socket.
pub(crate) fn is_transient_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
