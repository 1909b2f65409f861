//! # QUAY Protocol
//!
//! **QU**IC-style **A**uthenticated **Y**ielding transport
//!
//! QUAY is a small, QUIC-inspired reliable transport over UDP. It provides:
//!
//! - **Security**: finite-field Diffie-Hellman key agreement and
//!   ChaCha20-Poly1305 on every data packet
//! - **0-RTT**: data on the first flight once the server's public value is cached
//! - **Multiplexing**: independent ordered byte streams on one connection
//! - **Mobility**: connections are named by an 8-byte ID, so peers may roam
//! - **Pacing**: a BBR-style controller sizes the window and spaces sends
//!
//! ## Feature Flags
//!
//! - `transport` (default): varints, frames, packets, sockets
//! - `crypto` (default): DH handshake, AEAD, key store
//! - `stream` (default): sender engine and receiver
//! - `client` / `server` (default): async high-level APIs
//!
//! ## Modules
//!
//! - [`core`]: Core traits, constants, and error types (always included)
//! - [`congestion`]: BBR-style congestion controller (always included)
//! - [`transport`]: Wire codec and datagram transports (requires `transport` feature)
//! - [`crypto`]: Key agreement and AEAD (requires `crypto` feature)
//! - [`stream`]: Reliability layer (requires `stream` feature)
//! - [`client`] / [`server`]: High-level async APIs
//!
//! ## Example Usage
//!
//! ```rust
//! use quay_protocol::prelude::*;
//!
//! // A STREAM frame and its acknowledgment, as they appear inside a DATA packet.
//! let frames = vec![Frame::stream(1, 0, b"hello".to_vec()), Frame::ack(1, 0)];
//! let bytes = encode_frames(&frames).unwrap();
//! let (decoded, used) = decode_frames(&bytes).unwrap();
//! assert_eq!(decoded, frames);
//! assert_eq!(used, bytes.len());
//!
//! // Both sides of a handshake derive the same key.
//! let responder = Responder::generate();
//! let initiator = Initiator::new();
//! let init = initiator.init_packet();
//! let Packet::Init { connection_id, public_value } = Packet::parse(&init).unwrap() else {
//!     unreachable!()
//! };
//! let (server_key, accept) = responder.respond_to_init(connection_id, public_value).unwrap();
//! let session = initiator.complete(&accept).unwrap();
//! assert_eq!(session.key(), &server_key);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Congestion control (always included)
pub mod congestion;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Reliability layer (feature-gated)
#[cfg(feature = "stream")]
#[cfg_attr(docsrs, doc(cfg(feature = "stream")))]
pub mod stream;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::congestion::{Bbr, BbrState, CongestionController, CongestionDecision};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        decode_frames, encode_frames, CodecError, ConnectionId, Frame, MemoryNetwork,
        MemoryTransport, Packet, PacketError, PacketType, QuaySocket, TransportError,
        TransportResult, VarInt,
    };

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{
        open, seal, DhKeyPair, Initiator, Responder, Session, SessionKey, ZeroRttInitiator,
    };

    #[cfg(feature = "stream")]
    pub use crate::stream::{
        Delivery, Receiver, ReceiverStats, SenderConfig, SenderEngine, SenderStats,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{ClientConfig, ClientError, QuayClient, QuayClientBuilder};

    #[cfg(feature = "server")]
    pub use crate::server::{QuayServer, QuayServerBuilder, ServerConfig, ServerError};
}

// Re-export commonly used items at crate root
pub use crate::core::{CryptoError, HandshakeError, QuayError};

#[cfg(feature = "transport")]
pub use crate::transport::{ConnectionId, Frame, Packet};
