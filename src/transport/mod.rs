//! QUAY Protocol - Transport Layer
//!
//! Everything that touches bytes on the wire, below encryption:
//!
//! - **Varints**: [`varint`] QUIC-style variable-length integers
//! - **Frames**: [`Frame`] STREAM and ACK records inside a decrypted payload
//! - **Packets**: [`Packet`] the outer UDP payload and [`ConnectionId`]
//! - **Sockets**: [`QuaySocket`] tokio UDP and [`MemoryTransport`] for tests
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Stream Layer                 │
//! ├─────────────────────────────────────────┤
//! │            Security Layer               │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │     varints, frames, packets, sockets   │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod frame;
mod memory;
mod packet;
mod socket;
pub mod varint;

pub use error::*;
pub(crate) use error::is_transient_io;
pub use frame::*;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use packet::{ConnectionId, Packet, PacketType};
pub use socket::QuaySocket;
pub use varint::VarInt;
