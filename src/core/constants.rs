//! Protocol constants for the QUAY transport.
//!
//! These values are fixed by the wire format and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// PACKET TYPES (first byte of every UDP payload)
// =============================================================================

/// Encrypted data packet carrying one or more frames.
pub const PACKET_TYPE_DATA: u8 = 0x01;

/// Legacy acknowledgment (stream-id 1B + sequence 2B).
pub const PACKET_TYPE_ACK: u8 = 0x02;

/// Handshake initiation (connection ID + DH public value).
pub const PACKET_TYPE_INIT: u8 = 0x03;

/// Handshake response (connection ID echo + DH public value).
pub const PACKET_TYPE_ACCEPT: u8 = 0x04;

/// 0-RTT data: connection ID + DH public value + ciphertext.
pub const PACKET_TYPE_ZERO_RTT: u8 = 0x05;

// =============================================================================
// FRAME TYPES (varint tags inside decrypted payloads)
// =============================================================================

/// STREAM frame: stream-id, offset, length, bytes.
pub const FRAME_TYPE_STREAM: u64 = 0x08;

/// ACK frame: stream-id, acknowledged offset.
pub const FRAME_TYPE_ACK: u64 = 0x02;

// =============================================================================
// SIZES
// =============================================================================

/// Connection ID size.
pub const CONNECTION_ID_SIZE: usize = 8;

/// Fixed-width big-endian encoding of a DH public value (2048-bit group).
pub const DH_PUBLIC_SIZE: usize = 256;

/// DH private exponent size, also the persisted server key size.
pub const DH_PRIVATE_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Symmetric session key size (SHA-256 output).
pub const SESSION_KEY_SIZE: usize = 32;

/// Legacy ACK packet size (type + stream-id + sequence).
pub const LEGACY_ACK_SIZE: usize = 1 + 1 + 2;

/// Default STREAM frame chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default socket receive buffer.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

// =============================================================================
// VARINT LIMITS (two-bit width prefix)
// =============================================================================

/// Largest value encodable in 1 byte.
pub const VARINT_MAX_1: u64 = 63;

/// Largest value encodable in 2 bytes.
pub const VARINT_MAX_2: u64 = 16_383;

/// Largest value encodable in 4 bytes.
pub const VARINT_MAX_4: u64 = 1_073_741_823;

/// Largest value encodable in 8 bytes (2^62 - 1).
pub const VARINT_MAX_8: u64 = 4_611_686_018_427_387_903;

// =============================================================================
// RELIABILITY
// =============================================================================

/// Fixed retransmission timeout for unacknowledged STREAM frames.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on the blocking INIT/ACCEPT round trip.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how long the async loops park between polls.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// CONGESTION CONTROL (BBR-style state machine)
// =============================================================================

/// Ratio of mean to minimum RTT above which queuing is assumed.
pub const BBR_RTT_THRESHOLD: f64 = 1.25;

/// Ratio below which DRAIN is considered complete.
pub const BBR_DRAIN_EXIT: f64 = 1.10;

/// Time spent in CRUISE before probing for more bandwidth.
pub const BBR_CRUISE_DURATION: Duration = Duration::from_secs(5);

/// Staleness of `rtprop` that triggers PROBE_RTT.
pub const BBR_PROBE_RTT_INTERVAL: Duration = Duration::from_secs(10);

/// Time spent in PROBE_RTT with the reduced window.
pub const BBR_PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// Window used while in PROBE_RTT.
pub const BBR_PROBE_RTT_CWND: u32 = 4;

/// Time in DRAIN after which `rtprop` is considered stale and reset.
pub const BBR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum spacing between state machine evaluations.
pub const BBR_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Samples required before the state machine runs at all.
pub const BBR_MIN_SAMPLES: usize = 20;

/// Number of most recent samples used for mean/min.
pub const BBR_RTT_WINDOW: usize = 50;

/// Window below which growth is additive.
pub const BBR_ADDITIVE_LIMIT: u32 = 10;
