//! Error types for QUAY protocol.

use std::time::Duration;

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag, wrong key or truncated).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Peer DH public value is outside `[2, p - 2]`.
    #[error("invalid DH public value")]
    InvalidPublicValue,

    /// Stored or supplied key material has the wrong shape.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

/// Errors while establishing a connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No ACCEPT arrived before the caller's deadline.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// A packet of the wrong type was offered to the handshake.
    #[error("unexpected packet type during handshake: 0x{0:02x}")]
    UnexpectedPacket(u8),

    /// ACCEPT echoed a different connection ID.
    #[error("ACCEPT echoed a different connection ID")]
    ConnectionIdMismatch,

    /// Handshake packet could not be parsed.
    #[error("malformed handshake packet")]
    Malformed,

    /// Key agreement failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Socket error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level QUAY errors.
#[derive(Debug, Error)]
pub enum QuayError {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
